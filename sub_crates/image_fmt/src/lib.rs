//! Decoding of image files into planes of 32-bit float channels.

mod channel;
mod error;
mod exr_fmt;
mod hdr_fmt;
mod jpeg_fmt;
mod png_fmt;
mod selector;
mod tiff_fmt;

pub mod write;

use std::io::{Read, Seek, SeekFrom};

pub use channel::{head, layer_prefix, tail, Channel, ImageData};
pub use error::LoadError;
pub use selector::{matches, ChannelSelector};

/// Largest image any decoder accepts, in pixels.
pub const MAX_PIXELS: usize = hdr::MAX_PIXELS;

/// Anything a decoder can read from.
pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

/// A decoder for one image file format.
pub trait Decoder: Send + Sync {
    /// Human readable format name, for diagnostics.
    fn name(&self) -> &'static str;

    /// Cheap check of the file's magic bytes.
    ///
    /// The stream is left at the position it had on entry.
    fn can_load(&self, reader: &mut dyn ReadSeek) -> bool;

    /// Decodes the whole image, keeping only the channels the selector
    /// matches.
    fn load(
        &self,
        reader: &mut dyn ReadSeek,
        selector: &ChannelSelector,
    ) -> Result<ImageData, LoadError>;
}

static DECODERS: [&dyn Decoder; 5] = [
    &exr_fmt::ExrDecoder,
    &hdr_fmt::HdrDecoder,
    &png_fmt::PngDecoder,
    &jpeg_fmt::JpegDecoder,
    &tiff_fmt::TiffDecoder,
];

/// All available decoders, in the order they are tried.
pub fn decoders() -> &'static [&'static dyn Decoder] {
    &DECODERS
}

/// Finds the first decoder whose magic bytes match the stream.
pub fn find_decoder(reader: &mut dyn ReadSeek) -> Option<&'static dyn Decoder> {
    decoders().iter().copied().find(|d| d.can_load(reader))
}

/// True if any decoder recognizes the stream.
pub fn can_load(reader: &mut dyn ReadSeek) -> bool {
    find_decoder(reader).is_some()
}

/// Decodes an image with whichever decoder recognizes it.
///
/// Returns the decoded data along with the name of the decoder used.
pub fn load(
    reader: &mut dyn ReadSeek,
    selector: &ChannelSelector,
) -> Result<(ImageData, &'static str), LoadError> {
    let decoder = find_decoder(reader).ok_or(LoadError::UnknownFormat)?;

    let mut data = decoder.load(reader, selector)?;

    // Decoders may pre-filter for speed, but the final say is here so
    // that selection behaves identically for every format.
    data.retain_selected(selector);
    data.ensure_valid()?;

    Ok((data, decoder.name()))
}

/// Reads up to `N` bytes from the current position and seeks back.
pub(crate) fn peek<const N: usize>(reader: &mut dyn ReadSeek) -> Option<([u8; N], usize)> {
    let start = reader.stream_position().ok()?;
    let mut buf = [0u8; N];
    let mut filled = 0;
    let result = loop {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break Some((buf, filled)),
            Ok(n) => {
                filled += n;
                if filled == N {
                    break Some((buf, filled));
                }
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(_) => break None,
        }
    };
    reader.seek(SeekFrom::Start(start)).ok()?;
    result
}

/// Names for interleaved integer pixel layouts, by channel count.
pub(crate) fn channel_names(count: usize) -> &'static [&'static str] {
    match count {
        1 => &["L"],
        2 => &["L", "A"],
        3 => &["R", "G", "B"],
        _ => &["R", "G", "B", "A"],
    }
}

/// De-interleaves integer samples into float planes.
///
/// Color samples are treated as sRGB encoded and converted to linear,
/// alpha is kept linear.
pub(crate) fn planes_from_interleaved<T: Copy + Into<f32> + Sync>(
    dimensions: (usize, usize),
    channel_count: usize,
    data: &[T],
    max_value: f32,
) -> Vec<Channel> {
    use rayon::prelude::*;

    assert_eq!(data.len(), dimensions.0 * dimensions.1 * channel_count);
    channel_names(channel_count)
        .par_iter()
        .enumerate()
        .map(|(i, &name)| {
            let is_alpha = name == "A";
            let samples = data
                .chunks_exact(channel_count)
                .map(|pixel| {
                    let v = pixel[i].into() / max_value;
                    if is_alpha {
                        v
                    } else {
                        transfer_functions::srgb::to_linear(v)
                    }
                })
                .collect();
            Channel::new(name, dimensions, samples)
        })
        .collect()
}

/// Checks the stream for a fixed magic byte string.
pub(crate) fn has_magic(reader: &mut dyn ReadSeek, magic: &[u8]) -> bool {
    match peek::<16>(reader) {
        Some((buf, len)) => len >= magic.len() && buf[..magic.len()] == *magic,
        None => false,
    }
}
