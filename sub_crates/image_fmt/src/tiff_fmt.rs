use tiff::{decoder::DecodingResult, ColorType};

use crate::{
    error::LoadError, planes_from_interleaved, selector::ChannelSelector, Channel, ImageData,
    ReadSeek,
};

pub struct TiffDecoder;

impl crate::Decoder for TiffDecoder {
    fn name(&self) -> &'static str {
        "TIFF"
    }

    fn can_load(&self, reader: &mut dyn ReadSeek) -> bool {
        crate::has_magic(reader, b"II*\0") || crate::has_magic(reader, b"MM\0*")
    }

    fn load(
        &self,
        reader: &mut dyn ReadSeek,
        _selector: &ChannelSelector,
    ) -> Result<ImageData, LoadError> {
        let mut decoder =
            tiff::decoder::Decoder::new(reader)?.with_limits(tiff::decoder::Limits::unlimited());

        let (width, height) = decoder.dimensions()?;
        let dimensions = (width as usize, height as usize);
        let colortype = decoder.colortype()?;
        let channel_count = match colortype {
            ColorType::Gray(_) => 1,
            ColorType::GrayA(_) => 2,
            ColorType::RGB(_) => 3,
            ColorType::RGBA(_) => 4,
            other => {
                return Err(LoadError::UnsupportedFeature(format!(
                    "TIFF color type {:?}",
                    other
                )))
            }
        };

        let channels = match decoder.read_image()? {
            DecodingResult::U8(pixel_data) => {
                planes_from_interleaved(dimensions, channel_count, &pixel_data, 255.0)
            }
            DecodingResult::U16(pixel_data) => {
                planes_from_interleaved(dimensions, channel_count, &pixel_data, 65535.0)
            }
            // Float TIFFs are already linear.
            DecodingResult::F32(pixel_data) => crate::channel_names(channel_count)
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    Channel::new(
                        name,
                        dimensions,
                        pixel_data.iter().skip(i).step_by(channel_count).copied().collect(),
                    )
                })
                .collect(),
            _ => {
                return Err(LoadError::UnsupportedFeature(
                    "TIFF sample format".into(),
                ))
            }
        };

        Ok(ImageData::new(dimensions, channels, false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Decoder;

    #[test]
    fn sniffing() {
        let mut little = std::io::Cursor::new(b"II*\0\x08\0\0\0".to_vec());
        let mut big = std::io::Cursor::new(b"MM\0*\0\0\0\x08".to_vec());
        let mut png = std::io::Cursor::new(b"\x89PNG\r\n\x1a\n".to_vec());
        assert!(TiffDecoder.can_load(&mut little));
        assert!(TiffDecoder.can_load(&mut big));
        assert!(!TiffDecoder.can_load(&mut png));
    }

    #[test]
    fn garbage_after_magic_is_an_error() {
        let mut bad = std::io::Cursor::new(b"II*\0\xff\xff\xff\xff".to_vec());
        assert!(TiffDecoder.load(&mut bad, &ChannelSelector::all()).is_err());
    }
}
