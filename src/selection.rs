//! Gathering of the channels that end up on the canvas.

use rayon::prelude::*;

use image_fmt::Channel;

use crate::{
    image::{ChannelGroup, Image},
    tonemap::{apply_metric, Metric},
    Error,
};

/// The requested group if the image has it, otherwise the image's first
/// group.
pub fn resolve_group<'a>(image: &'a Image, requested: &str) -> Option<&'a ChannelGroup> {
    image
        .channel_group(requested)
        .or_else(|| image.channel_groups().first())
}

/// Maps a pixel coordinate of an image to the nearest pixel of an image
/// of a different size, by pixel centers.
#[inline]
pub fn nearest_coordinate(x: usize, from_size: usize, to_size: usize) -> usize {
    if from_size == to_size {
        return x;
    }
    let scaled = ((x as f64 + 0.5) * to_size as f64 / from_size as f64).floor() as usize;
    scaled.min(to_size.saturating_sub(1))
}

/// Nearest-neighbour resampling of a channel to new dimensions.
pub fn resample_nearest(channel: &Channel, dimensions: (usize, usize)) -> Channel {
    if channel.dimensions() == dimensions {
        return channel.clone();
    }

    let (src_w, src_h) = channel.dimensions();
    let (w, h) = dimensions;
    let data = (0..(w * h))
        .into_par_iter()
        .map(|i| {
            let sx = nearest_coordinate(i % w, w, src_w);
            let sy = nearest_coordinate(i / w, h, src_h);
            channel.at(sx, sy)
        })
        .collect();

    Channel::new(channel.name(), dimensions, data)
}

/// The channels of `group` in `image`, with `metric` against `reference`
/// applied to every color channel.
///
/// The result always has the dimensions of `image`.  A channel missing
/// from the reference compares against zero.  Alpha is passed through.
pub fn channels_from_images(
    image: &Image,
    reference: Option<&Image>,
    group: &str,
    metric: Metric,
) -> Result<Vec<Channel>, Error> {
    let group = image
        .channel_group(group)
        .ok_or_else(|| Error::NotFound(group.into()))?;

    group
        .channels
        .par_iter()
        .map(|name| {
            let chan = image.channel(name)?;
            let reference = match reference {
                Some(reference) if image_fmt::tail(name) != "A" => reference,
                _ => return Ok(chan.clone()),
            };

            let data = match reference.channel(name) {
                Ok(ref_chan) => {
                    let ref_chan = resample_nearest(ref_chan, chan.dimensions());
                    chan.data()
                        .par_iter()
                        .zip(ref_chan.data().par_iter())
                        .map(|(&v, &r)| apply_metric(v, r, metric))
                        .collect()
                }
                Err(_) => chan
                    .data()
                    .par_iter()
                    .map(|&v| apply_metric(v, 0.0, metric))
                    .collect(),
            };

            Ok(Channel::new(name, chan.dimensions(), data))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image_fmt::{ChannelSelector, ImageData};
    use std::path::Path;

    fn image(dimensions: (usize, usize), channels: Vec<(&str, Vec<f32>)>) -> Image {
        Image::new(
            Path::new("test.exr"),
            ChannelSelector::all(),
            ImageData::new(
                dimensions,
                channels
                    .into_iter()
                    .map(|(n, d)| Channel::new(n, dimensions, d))
                    .collect(),
                true,
            ),
        )
    }

    #[test]
    fn nearest_mapping() {
        // Downsampling by 2 picks every other pixel.
        assert_eq!(nearest_coordinate(0, 4, 2), 0);
        assert_eq!(nearest_coordinate(1, 4, 2), 0);
        assert_eq!(nearest_coordinate(2, 4, 2), 1);
        assert_eq!(nearest_coordinate(3, 4, 2), 1);

        // Upsampling.
        assert_eq!(nearest_coordinate(0, 2, 4), 1);
        assert_eq!(nearest_coordinate(1, 2, 4), 3);

        assert_eq!(nearest_coordinate(5, 7, 7), 5);
    }

    #[test]
    fn resampling() {
        let c = Channel::new("Y", (2, 2), vec![0.0, 1.0, 2.0, 3.0]);
        let up = resample_nearest(&c, (4, 4));
        assert_eq!(up.dimensions(), (4, 4));
        assert_eq!(
            up.data(),
            &[
                0.0, 0.0, 1.0, 1.0, //
                0.0, 0.0, 1.0, 1.0, //
                2.0, 2.0, 3.0, 3.0, //
                2.0, 2.0, 3.0, 3.0,
            ]
        );

        let down = resample_nearest(&up, (2, 2));
        assert_eq!(down.data(), c.data());
    }

    #[test]
    fn metric_against_reference() {
        let img = image((2, 1), vec![("Y", vec![1.0, 4.0]), ("A", vec![1.0, 0.5])]);
        let reference = image((2, 1), vec![("Y", vec![3.0, 1.0])]);

        let channels =
            channels_from_images(&img, Some(&reference), "Y,A", Metric::AbsoluteError).unwrap();
        assert_eq!(channels[0].data(), &[2.0, 3.0]);
        // Alpha is untouched, even though the reference has none.
        assert_eq!(channels[1].data(), &[1.0, 0.5]);
    }

    #[test]
    fn missing_reference_channel_is_zero() {
        let img = image((2, 1), vec![("Z", vec![-1.0, 2.0])]);
        let reference = image((2, 1), vec![("R", vec![5.0, 5.0])]);
        let channels =
            channels_from_images(&img, Some(&reference), "Z", Metric::SquaredError).unwrap();
        assert_eq!(channels[0].data(), &[1.0, 4.0]);
    }

    #[test]
    fn reference_of_different_size() {
        let img = image((4, 1), vec![("Y", vec![1.0, 1.0, 1.0, 1.0])]);
        let reference = image((2, 1), vec![("Y", vec![0.0, 1.0])]);
        let channels = channels_from_images(&img, Some(&reference), "Y", Metric::Error).unwrap();
        assert_eq!(channels[0].dimensions(), (4, 1));
        assert_eq!(channels[0].data(), &[1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn without_reference() {
        let img = image((1, 1), vec![("R", vec![0.5]), ("G", vec![0.25]), ("B", vec![0.0])]);
        let channels = channels_from_images(&img, None, "R,G,B", Metric::SquaredError).unwrap();
        let values: Vec<f32> = channels.iter().map(|c| c.eval(0)).collect();
        assert_eq!(values, vec![0.5, 0.25, 0.0]);

        assert!(matches!(
            channels_from_images(&img, None, "X", Metric::Error),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn group_fallback() {
        let img = image((1, 1), vec![("R", vec![0.5]), ("G", vec![0.25]), ("B", vec![0.0])]);
        assert_eq!(resolve_group(&img, "R,G,B").unwrap().name, "R,G,B");
        assert_eq!(resolve_group(&img, "nonexistent").unwrap().name, "R,G,B");
    }
}
