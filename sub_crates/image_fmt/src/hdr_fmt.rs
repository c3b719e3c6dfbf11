use std::io::BufReader;

use crate::{error::LoadError, selector::ChannelSelector, Channel, ImageData, ReadSeek};

/// Radiance RGBE, via the `hdr` crate.
pub struct HdrDecoder;

impl crate::Decoder for HdrDecoder {
    fn name(&self) -> &'static str {
        "Radiance HDR"
    }

    fn can_load(&self, reader: &mut dyn ReadSeek) -> bool {
        match crate::peek::<10>(reader) {
            Some((buf, len)) => hdr::is_hdr(&buf[..len]),
            None => false,
        }
    }

    fn load(
        &self,
        reader: &mut dyn ReadSeek,
        _selector: &ChannelSelector,
    ) -> Result<ImageData, LoadError> {
        let image = hdr::read_hdr(&mut BufReader::new(reader))?;
        let dimensions = (image.width, image.height);

        let channels = ["R", "G", "B"]
            .iter()
            .enumerate()
            .map(|(i, name)| {
                Channel::new(name, dimensions, image.pixels.iter().map(|p| p[i]).collect())
            })
            .collect();

        Ok(ImageData::new(dimensions, channels, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Decoder;

    #[test]
    fn reads_written_file() {
        let mut bytes = Vec::new();
        hdr::write_hdr(&mut bytes, &[[1.0, 2.0, 4.0], [0.5, 0.0, 8.0]], 2, 1, 1.0).unwrap();

        let mut cursor = std::io::Cursor::new(bytes);
        assert!(HdrDecoder.can_load(&mut cursor));
        let data = HdrDecoder.load(&mut cursor, &ChannelSelector::all()).unwrap();

        assert_eq!(data.dimensions, (2, 1));
        assert_eq!(data.channel("R").unwrap().at(0, 0), 1.0);
        assert_eq!(data.channel("G").unwrap().at(0, 0), 2.0);
        assert_eq!(data.channel("B").unwrap().at(1, 0), 8.0);
    }
}
