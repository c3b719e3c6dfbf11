//! Plain text output for the terminal.

use glam::Vec2;

use lib::{CanvasStatistics, Image, NUM_BINS};

/// Columns of the text histogram.
const HISTOGRAM_WIDTH: usize = 50;
const BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

pub fn image_summary(image: &Image) -> String {
    let mut text = image.to_string();
    let groups: Vec<&str> = image
        .channel_groups()
        .iter()
        .map(|g| g.name.as_str())
        .collect();
    text.push_str(&format!("\nGroups: {}", groups.join("  ")));
    text
}

pub fn statistics(group: &str, stats: &CanvasStatistics) -> String {
    let mut text = format!(
        "Statistics of {}:\n  mean {:.6}  min {:.6}  max {:.6}",
        group, stats.mean, stats.minimum, stats.maximum
    );
    for c in 0..stats.n_channels {
        text.push_str(&format!("\n  {}", histogram_line(stats.channel_histogram(c))));
    }
    text
}

/// Squeezes one channel's histogram into a single line of bar characters.
pub fn histogram_line(buckets: &[f32]) -> String {
    let per_column = (NUM_BINS + HISTOGRAM_WIDTH - 1) / HISTOGRAM_WIDTH;
    let columns: Vec<f32> = buckets
        .chunks(per_column)
        .map(|chunk| chunk.iter().sum())
        .collect();
    let max = columns.iter().copied().fold(0.0f32, f32::max);

    columns
        .iter()
        .map(|&v| {
            if v <= 0.0 || max <= 0.0 {
                ' '
            } else {
                let i = ((v / max) * (BARS.len() - 1) as f32).round() as usize;
                BARS[i.min(BARS.len() - 1)]
            }
        })
        .collect()
}

pub fn probe(pixel: Vec2, channels: &[&str], values: &[f32]) -> String {
    let pairs: Vec<String> = channels
        .iter()
        .zip(values.iter())
        .map(|(name, value)| format!("{}={:.6}", name, value))
        .collect();
    format!("Pixel ({}, {}): {}", pixel.x, pixel.y, pairs.join("  "))
}
