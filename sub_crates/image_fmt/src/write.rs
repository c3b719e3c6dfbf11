//! Writing of display-ready images.

use std::io::Write;

/// Writes 8-bit straight-alpha RGBA pixels as a PNG file.
pub fn write_png<W: Write>(
    out: W,
    rgba: &[u8],
    width: usize,
    height: usize,
) -> Result<(), png::EncodingError> {
    assert_eq!(rgba.len(), width * height * 4);

    let mut encoder = png::Encoder::new(out, width as u32, height as u32);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);

    let mut writer = encoder.write_header()?;
    writer.write_image_data(rgba)?;
    writer.finish()
}
