use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use image_fmt::{layer_prefix, Channel, ChannelSelector, ImageData};

use crate::Error;

static NEXT_IMAGE_ID: AtomicUsize = AtomicUsize::new(1);

/// Hands out a new, never before used, image id.
pub fn next_image_id() -> usize {
    NEXT_IMAGE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Component sets that are displayed together, in order of preference.
const KNOWN_GROUPS: &[&[&str]] = &[
    &["R", "G", "B"],
    &["r", "g", "b"],
    &["X", "Y", "Z"],
    &["x", "y", "z"],
    &["U", "V"],
    &["u", "v"],
    &["Z"],
    &["z"],
];

/// A set of channels of one layer that are displayed together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelGroup {
    pub name: String,
    /// Full channel names, color components first and alpha (if any) last.
    pub channels: Vec<String>,
}

impl ChannelGroup {
    fn new(layer: &str, channels: Vec<String>) -> ChannelGroup {
        let tails: Vec<&str> = channels.iter().map(|c| image_fmt::tail(c)).collect();
        let joined = tails.join(",");

        let name = if layer.is_empty() {
            joined
        } else if tails.len() == 1 {
            format!("{}.{}", layer, joined)
        } else {
            format!("{}.({})", layer, joined)
        };

        ChannelGroup {
            name: name,
            channels: channels,
        }
    }

    /// The group's channels excluding alpha.
    pub fn color_channels(&self) -> impl Iterator<Item = &str> {
        self.channels
            .iter()
            .map(|c| c.as_str())
            .filter(|c| image_fmt::tail(c) != "A")
    }

    /// The group's alpha channel, if it has one.
    pub fn alpha_channel(&self) -> Option<&str> {
        self.channels
            .iter()
            .map(|c| c.as_str())
            .find(|c| image_fmt::tail(c) == "A")
    }
}

/// A loaded image.  Immutable once created.
#[derive(Debug)]
pub struct Image {
    id: usize,
    path: PathBuf,
    selector: ChannelSelector,
    name: String,
    data: ImageData,
    groups: Vec<ChannelGroup>,
}

impl Image {
    pub fn new(path: &Path, selector: ChannelSelector, data: ImageData) -> Image {
        Image::with_id(next_image_id(), path, selector, data)
    }

    pub fn with_id(id: usize, path: &Path, selector: ChannelSelector, data: ImageData) -> Image {
        let name = if selector.is_empty() {
            path.display().to_string()
        } else {
            format!("{}:{}", path.display(), selector.pattern())
        };

        let groups = data
            .layers
            .iter()
            .flat_map(|layer| grouped_channels(&data, layer))
            .collect();

        Image {
            id: id,
            path: path.into(),
            selector: selector,
            name: name,
            data: data,
            groups: groups,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn selector(&self) -> &ChannelSelector {
        &self.selector
    }

    /// The path, with the channel selector appended if there is one.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Like `name()`, but with just the file name instead of the full path.
    pub fn short_name(&self) -> String {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string());
        if self.selector.is_empty() {
            file_name
        } else {
            format!("{}:{}", file_name, self.selector.pattern())
        }
    }

    pub fn data(&self) -> &ImageData {
        &self.data
    }

    pub fn dimensions(&self) -> (usize, usize) {
        self.data.dimensions
    }

    pub fn width(&self) -> usize {
        self.data.dimensions.0
    }

    pub fn height(&self) -> usize {
        self.data.dimensions.1
    }

    pub fn channels(&self) -> &[Channel] {
        &self.data.channels
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.data.has_channel(name)
    }

    pub fn channel(&self, name: &str) -> Result<&Channel, Error> {
        self.data
            .channel(name)
            .ok_or_else(|| Error::NotFound(name.into()))
    }

    pub fn layers(&self) -> &[String] {
        &self.data.layers
    }

    pub fn channel_groups(&self) -> &[ChannelGroup] {
        &self.groups
    }

    pub fn channel_group(&self, name: &str) -> Option<&ChannelGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub fn channels_in_group(&self, group_name: &str) -> Result<Vec<&Channel>, Error> {
        let group = self
            .channel_group(group_name)
            .ok_or_else(|| Error::NotFound(group_name.into()))?;
        group.channels.iter().map(|c| self.channel(c)).collect()
    }

    /// All channels of a layer in group order, with alpha listed once.
    pub fn sorted_channels<'a>(&'a self, layer: &str) -> Vec<&'a str> {
        let mut result: Vec<&'a str> = Vec::new();
        for group in grouped_channels_ref(&self.groups, layer) {
            for name in group.channels.iter() {
                if !result.contains(&name.as_str()) {
                    result.push(name);
                }
            }
        }
        result
    }
}

impl std::fmt::Display for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Path: {}", self.name)?;
        writeln!(f, "Resolution: {}x{}", self.width(), self.height())?;
        write!(f, "Channels:")?;
        for layer in self.layers() {
            let channels: Vec<&str> = self
                .sorted_channels(layer)
                .into_iter()
                .map(image_fmt::tail)
                .collect();
            if layer.is_empty() {
                write!(f, "\n  {}", channels.join(","))?;
            } else {
                write!(f, "\n  {}: {}", layer, channels.join(","))?;
            }
        }
        Ok(())
    }
}

fn grouped_channels_ref<'a, 'b>(
    groups: &'a [ChannelGroup],
    layer: &'b str,
) -> impl Iterator<Item = &'a ChannelGroup> + 'b
where
    'a: 'b,
{
    groups
        .iter()
        .filter(move |g| g.channels.first().map(|c| image_fmt::head(c)) == Some(layer))
}

/// Splits the channels of one layer into display groups.
fn grouped_channels(data: &ImageData, layer: &str) -> Vec<ChannelGroup> {
    let prefix = layer_prefix(layer);
    let alpha_name = format!("{}A", prefix);

    let mut remaining: Vec<&str> = data.channels_in_layer(layer);
    let has_alpha = match remaining.iter().position(|&c| c == alpha_name) {
        Some(i) => {
            remaining.remove(i);
            true
        }
        None => false,
    };

    let with_alpha = |mut channels: Vec<String>| {
        if has_alpha {
            channels.push(alpha_name.clone());
        }
        ChannelGroup::new(layer, channels)
    };

    let mut groups = Vec::new();
    for known in KNOWN_GROUPS {
        let mut channels = Vec::new();
        for component in known.iter() {
            let name = format!("{}{}", prefix, component);
            if let Some(i) = remaining.iter().position(|&c| c == name) {
                remaining.remove(i);
                channels.push(name);
            }
        }
        if !channels.is_empty() {
            groups.push(with_alpha(channels));
        }
    }

    remaining.sort_unstable();
    for name in remaining {
        groups.push(with_alpha(vec![name.to_string()]));
    }

    if groups.is_empty() && has_alpha {
        groups.push(ChannelGroup::new(layer, vec![alpha_name.clone()]));
    }

    groups
}
