use crate::{
    error::LoadError, has_magic, planes_from_interleaved, selector::ChannelSelector, ImageData,
    ReadSeek,
};

const MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

pub struct PngDecoder;

impl crate::Decoder for PngDecoder {
    fn name(&self) -> &'static str {
        "PNG"
    }

    fn can_load(&self, reader: &mut dyn ReadSeek) -> bool {
        has_magic(reader, &MAGIC)
    }

    fn load(
        &self,
        reader: &mut dyn ReadSeek,
        _selector: &ChannelSelector,
    ) -> Result<ImageData, LoadError> {
        let mut decoder = png::Decoder::new_with_limits(
            reader,
            png::Limits {
                bytes: std::usize::MAX,
            },
        );
        // Palettes and sub-byte depths get expanded to plain 8-bit.
        decoder.set_transformations(png::Transformations::EXPAND);
        let mut reader = decoder.read_info()?;

        let mut pixel_data = vec![0u8; reader.output_buffer_size()];
        let info = reader.next_frame(&mut pixel_data)?;
        pixel_data.truncate(info.buffer_size());

        let dimensions = (info.width as usize, info.height as usize);
        let channel_count = info.color_type.samples();

        use png::BitDepth::*;
        let channels = match info.bit_depth {
            Eight => planes_from_interleaved(dimensions, channel_count, &pixel_data, 255.0),
            Sixteen => {
                let wide: Vec<u16> = pixel_data
                    .chunks_exact(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect();
                planes_from_interleaved(dimensions, channel_count, &wide, 65535.0)
            }
            depth => {
                return Err(LoadError::UnsupportedFeature(format!(
                    "PNG bit depth {:?}",
                    depth
                )))
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
    fn rgba8() {
        let mut bytes = Vec::new();
        crate::write::write_png(&mut bytes, &[255, 0, 0, 255, 0, 128, 0, 51], 2, 1).unwrap();

        let mut cursor = std::io::Cursor::new(bytes);
        assert!(PngDecoder.can_load(&mut cursor));
        let data = PngDecoder.load(&mut cursor, &ChannelSelector::all()).unwrap();

        assert_eq!(data.dimensions, (2, 1));
        assert!(!data.has_premultiplied_alpha);
        let names: Vec<_> = data.channels.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["R", "G", "B", "A"]);

        assert_eq!(data.channel("R").unwrap().at(0, 0), 1.0);
        // sRGB decoded color, linear alpha.
        let g = data.channel("G").unwrap().at(1, 0);
        assert!((g - transfer_functions::srgb::u8_to_linear(128)).abs() < 1e-6);
        assert!((data.channel("A").unwrap().at(1, 0) - 0.2).abs() < 1e-6);
    }
}
