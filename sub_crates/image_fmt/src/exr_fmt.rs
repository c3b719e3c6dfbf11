use std::io::{Cursor, Read};

use exr::prelude::{self as exrs, ReadChannels, ReadLayers};

use crate::{
    error::LoadError, has_magic, layer_prefix, selector::ChannelSelector, Channel, ImageData,
    ReadSeek,
};

const MAGIC: [u8; 4] = [0x76, 0x2f, 0x31, 0x01];

/// OpenEXR, all layers and channels, via the `exr` crate.
pub struct ExrDecoder;

impl crate::Decoder for ExrDecoder {
    fn name(&self) -> &'static str {
        "OpenEXR"
    }

    fn can_load(&self, reader: &mut dyn ReadSeek) -> bool {
        has_magic(reader, &MAGIC)
    }

    fn load(
        &self,
        reader: &mut dyn ReadSeek,
        selector: &ChannelSelector,
    ) -> Result<ImageData, LoadError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;

        let image = exrs::read()
            .no_deep_data()
            .largest_resolution_level()
            .all_channels()
            .all_layers()
            .all_attributes()
            .from_buffered(Cursor::new(bytes))?;

        let display = image.attributes.display_window;
        let dimensions = (display.size.width(), display.size.height());
        match dimensions.0.checked_mul(dimensions.1) {
            Some(n) if n <= crate::MAX_PIXELS => {}
            _ => {
                return Err(LoadError::Malformed(format!(
                    "display window of {}x{} pixels is too large",
                    dimensions.0, dimensions.1
                )))
            }
        }

        let mut channels = Vec::new();
        let mut warnings = Vec::new();
        for layer in image.layer_data.iter() {
            let layer_name = layer
                .attributes
                .layer_name
                .as_ref()
                .map(|name| name.to_string())
                .unwrap_or_default();
            let size = (layer.size.width(), layer.size.height());

            // Data window position within the display window.
            let position = layer.attributes.layer_position;
            let offset = (
                position.x() as i64 - display.position.x() as i64,
                position.y() as i64 - display.position.y() as i64,
            );

            for chan in layer.channel_data.list.iter() {
                let name = layer_prefix(&layer_name) + &chan.name.to_string();
                if !selector.matches(&name) {
                    continue;
                }

                let samples = &chan.sample_data;
                if offset == (0, 0) && size == dimensions {
                    let data: Vec<f32> = (0..(size.0 * size.1))
                        .map(|i| samples.value_by_flat_index(i).to_f32())
                        .collect();
                    channels.push(Channel::new(&name, size, data));
                    continue;
                }

                let mut data = vec![0.0f32; dimensions.0 * dimensions.1];
                let mut clipped = 0usize;
                for y in 0..size.1 {
                    let dy = y as i64 + offset.1;
                    for x in 0..size.0 {
                        let dx = x as i64 + offset.0;
                        let inside = dx >= 0
                            && dy >= 0
                            && dx < dimensions.0 as i64
                            && dy < dimensions.1 as i64;
                        if !inside {
                            clipped += 1;
                            continue;
                        }
                        data[dy as usize * dimensions.0 + dx as usize] =
                            samples.value_by_flat_index(y * size.0 + x).to_f32();
                    }
                }
                if clipped > 0 {
                    warnings.push(format!(
                        "{} samples of channel \"{}\" lie outside the display window",
                        clipped, name
                    ));
                }
                channels.push(Channel::new(&name, dimensions, data));
            }
        }

        let mut data = ImageData::new(dimensions, channels, true);
        data.warnings = warnings;
        Ok(data)
    }
}
