use rayon::prelude::*;

use crate::{error::LoadError, selector::ChannelSelector};

/// A single named plane of 32-bit float samples, stored row-major.
#[derive(Debug, Clone)]
pub struct Channel {
    name: String,
    dimensions: (usize, usize),
    data: Vec<f32>,
}

impl Channel {
    pub fn new(name: &str, dimensions: (usize, usize), data: Vec<f32>) -> Channel {
        assert_eq!(data.len(), dimensions.0 * dimensions.1);
        Channel {
            name: name.into(),
            dimensions: dimensions,
            data: data,
        }
    }

    /// A channel of the given size with every sample set to `value`.
    pub fn filled(name: &str, dimensions: (usize, usize), value: f32) -> Channel {
        Channel::new(name, dimensions, vec![value; dimensions.0 * dimensions.1])
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The layer part of the name, e.g. "diffuse" for "diffuse.R".
    pub fn head(&self) -> &str {
        head(&self.name)
    }

    /// The component part of the name, e.g. "R" for "diffuse.R".
    pub fn tail(&self) -> &str {
        tail(&self.name)
    }

    pub fn dimensions(&self) -> (usize, usize) {
        self.dimensions
    }

    pub fn width(&self) -> usize {
        self.dimensions.0
    }

    pub fn height(&self) -> usize {
        self.dimensions.1
    }

    pub fn count(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn eval(&self, index: usize) -> f32 {
        self.data[index]
    }

    /// Panics if `(x, y)` is outside of the channel.
    #[inline]
    pub fn at(&self, x: usize, y: usize) -> f32 {
        assert!(x < self.dimensions.0 && y < self.dimensions.1);
        self.data[y * self.dimensions.0 + x]
    }

    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.data.par_iter().map(|&v| v as f64).sum();
        (sum / self.data.len() as f64) as f32
    }

    /// Returns `None` for empty channels.
    pub fn min_max(&self) -> Option<(f32, f32)> {
        if self.data.is_empty() {
            return None;
        }
        Some(self.data.par_iter().fold(
            || (f32::INFINITY, f32::NEG_INFINITY),
            |(lo, hi), &v| (lo.min(v), hi.max(v)),
        ).reduce(
            || (f32::INFINITY, f32::NEG_INFINITY),
            |a, b| (a.0.min(b.0), a.1.max(b.1)),
        ))
    }

    pub fn multiply_with(&mut self, other: &Channel) {
        assert_eq!(self.dimensions, other.dimensions);
        self.data
            .par_iter_mut()
            .zip(other.data.par_iter())
            .for_each(|(v, &a)| *v *= a);
    }

    /// Divides by `other`, leaving samples untouched where `other` is zero.
    pub fn divide_by(&mut self, other: &Channel) {
        assert_eq!(self.dimensions, other.dimensions);
        self.data
            .par_iter_mut()
            .zip(other.data.par_iter())
            .for_each(|(v, &a)| {
                if a != 0.0 {
                    *v /= a;
                }
            });
    }
}

/// The layer part of a channel name.
pub fn head(name: &str) -> &str {
    match name.rfind('.') {
        Some(i) => &name[..i],
        None => "",
    }
}

/// The component part of a channel name.
pub fn tail(name: &str) -> &str {
    match name.rfind('.') {
        Some(i) => &name[(i + 1)..],
        None => name,
    }
}

/// Everything a decoder produces for one image.
#[derive(Debug, Clone)]
pub struct ImageData {
    pub dimensions: (usize, usize),
    pub channels: Vec<Channel>,
    /// Layer names in order of first appearance.  The root layer is "".
    pub layers: Vec<String>,
    pub has_premultiplied_alpha: bool,
    /// Things that were skipped or approximated while decoding.
    pub warnings: Vec<String>,
}

impl ImageData {
    pub fn new(dimensions: (usize, usize), channels: Vec<Channel>, has_premultiplied_alpha: bool) -> ImageData {
        let mut data = ImageData {
            dimensions: dimensions,
            channels: channels,
            layers: Vec::new(),
            has_premultiplied_alpha: has_premultiplied_alpha,
            warnings: Vec::new(),
        };
        data.update_layers();
        data
    }

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.name() == name)
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.channel(name).is_some()
    }

    /// Names of the channels that belong directly to `layer`.
    pub fn channels_in_layer(&self, layer: &str) -> Vec<&str> {
        self.channels
            .iter()
            .map(|c| c.name())
            .filter(|name| head(name) == layer)
            .collect()
    }

    /// Drops every channel the selector doesn't match.
    pub fn retain_selected(&mut self, selector: &ChannelSelector) {
        self.channels.retain(|c| selector.matches(c.name()));
        self.update_layers();
    }

    pub fn ensure_valid(&self) -> Result<(), LoadError> {
        if self.channels.is_empty() {
            return Err(LoadError::NoChannels);
        }

        for c in self.channels.iter() {
            if c.dimensions() != self.dimensions {
                return Err(LoadError::Malformed(format!(
                    "all channels must have the same size as their image ({}: {}x{} != {}x{})",
                    c.name(),
                    c.width(),
                    c.height(),
                    self.dimensions.0,
                    self.dimensions.1,
                )));
            }
        }

        Ok(())
    }

    /// Converts straight alpha to premultiplied alpha.
    pub fn multiply_alpha(&mut self) {
        if !self.has_premultiplied_alpha {
            self.alpha_operation(Channel::multiply_with);
            self.has_premultiplied_alpha = true;
        }
    }

    /// Converts premultiplied alpha to straight alpha.
    pub fn unmultiply_alpha(&mut self) {
        if self.has_premultiplied_alpha {
            self.alpha_operation(Channel::divide_by);
            self.has_premultiplied_alpha = false;
        }
    }

    fn alpha_operation(&mut self, op: fn(&mut Channel, &Channel)) {
        for layer in self.layers.clone() {
            let alpha_name = layer_prefix(&layer) + "A";
            let alpha = match self.channel(&alpha_name) {
                Some(alpha) => alpha.clone(),
                None => continue,
            };
            for chan in self.channels.iter_mut() {
                if chan.head() == layer && chan.name() != alpha_name {
                    op(chan, &alpha);
                }
            }
        }
    }

    fn update_layers(&mut self) {
        self.layers.clear();
        for c in self.channels.iter() {
            if !self.layers.iter().any(|l| l == c.head()) {
                self.layers.push(c.head().into());
            }
        }
    }
}

/// "layer." for named layers, "" for the root layer.
pub fn layer_prefix(layer: &str) -> String {
    if layer.is_empty() {
        String::new()
    } else {
        format!("{}.", layer)
    }
}
