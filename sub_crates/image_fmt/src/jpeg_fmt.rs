use crate::{
    error::LoadError, has_magic, planes_from_interleaved, selector::ChannelSelector, ImageData,
    ReadSeek,
};

pub struct JpegDecoder;

impl crate::Decoder for JpegDecoder {
    fn name(&self) -> &'static str {
        "JPEG"
    }

    fn can_load(&self, reader: &mut dyn ReadSeek) -> bool {
        has_magic(reader, &[0xff, 0xd8, 0xff])
    }

    fn load(
        &self,
        reader: &mut dyn ReadSeek,
        _selector: &ChannelSelector,
    ) -> Result<ImageData, LoadError> {
        let mut decoder = jpeg_decoder::Decoder::new(std::io::BufReader::new(reader));
        let pixel_data = decoder.decode()?;

        let info = decoder
            .info()
            .ok_or_else(|| LoadError::Malformed("missing JPEG frame header".into()))?;
        let dimensions = (info.width as usize, info.height as usize);

        use jpeg_decoder::PixelFormat::*;
        let channels = match info.pixel_format {
            RGB24 => planes_from_interleaved(dimensions, 3, &pixel_data, 255.0),
            L8 => planes_from_interleaved(dimensions, 1, &pixel_data, 255.0),
            L16 => {
                // jpeg-decoder hands out 16-bit samples in native endianness.
                let wide: Vec<u16> = pixel_data
                    .chunks_exact(2)
                    .map(|c| u16::from_ne_bytes([c[0], c[1]]))
                    .collect();
                planes_from_interleaved(dimensions, 1, &wide, 65535.0)
            }
            format => {
                return Err(LoadError::UnsupportedFeature(format!(
                    "JPEG pixel format {:?}",
                    format
                )))
            }
        };

        Ok(ImageData::new(dimensions, channels, true))
    }
}
