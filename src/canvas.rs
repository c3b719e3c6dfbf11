//! The canvas: what's displayed, and how.

use std::{
    fs::File,
    io::BufWriter,
    path::Path,
    sync::Arc,
};

use glam::Vec2;
use rayon::prelude::*;

use image_fmt::Channel;
use job_queue::{JobQueue, Task};

use crate::{
    image::{ChannelGroup, Image},
    selection::{channels_from_images, nearest_coordinate, resolve_group},
    statistics::{CanvasStatistics, StatisticsCache, StatisticsKey},
    tonemap::{apply_metric, DisplayParams, Metric, Tonemap},
    transform::{Transform, Viewport},
    Error,
};

/// Statistics requests from the canvas go ahead of background loads.
const STATISTICS_PRIORITY: i32 = 1;

pub struct Canvas {
    job_queue: Arc<JobQueue>,
    statistics_cache: Arc<StatisticsCache>,

    image: Option<Arc<Image>>,
    reference: Option<Arc<Image>>,
    requested_group: String,
    params: DisplayParams,
    transform: Transform,

    statistics: Option<(StatisticsKey, Task<Arc<CanvasStatistics>>)>,
}

impl Canvas {
    pub fn new(
        job_queue: Arc<JobQueue>,
        statistics_cache: Arc<StatisticsCache>,
        viewport: Viewport,
    ) -> Canvas {
        Canvas {
            job_queue: job_queue,
            statistics_cache: statistics_cache,
            image: None,
            reference: None,
            requested_group: String::new(),
            params: DisplayParams::default(),
            transform: Transform::new(viewport),
            statistics: None,
        }
    }

    //----------------------------------------------------------------
    // What's displayed.

    pub fn image(&self) -> Option<&Arc<Image>> {
        self.image.as_ref()
    }

    /// Statistics of images that are no longer alive anywhere are dropped
    /// from the cache.
    pub fn set_image(&mut self, image: Option<Arc<Image>>) {
        self.image = image;
        self.statistics_cache.prune();
    }

    pub fn reference(&self) -> Option<&Arc<Image>> {
        self.reference.as_ref()
    }

    pub fn set_reference(&mut self, reference: Option<Arc<Image>>) {
        self.reference = reference;
        self.statistics_cache.prune();
    }

    pub fn requested_channel_group(&self) -> &str {
        &self.requested_group
    }

    pub fn set_requested_channel_group(&mut self, group: &str) {
        self.requested_group = group.into();
    }

    /// The group actually displayed: the requested one if the image has
    /// it, otherwise the image's first group.
    pub fn channel_group(&self) -> Option<&ChannelGroup> {
        self.image
            .as_ref()
            .and_then(|image| resolve_group(image, &self.requested_group))
    }

    //----------------------------------------------------------------
    // How it's displayed.

    pub fn display_params(&self) -> DisplayParams {
        self.params
    }

    /// Replaces all display parameters at once.  Invalid parameters are
    /// rejected and leave the canvas unchanged.
    pub fn set_display_params(&mut self, params: DisplayParams) -> Result<(), Error> {
        params.validate()?;
        self.params = params;
        Ok(())
    }

    pub fn set_exposure(&mut self, exposure: f32) -> Result<(), Error> {
        self.set_display_params(DisplayParams {
            exposure: exposure,
            ..self.params
        })
    }

    pub fn set_offset(&mut self, offset: f32) -> Result<(), Error> {
        self.set_display_params(DisplayParams {
            offset: offset,
            ..self.params
        })
    }

    pub fn set_gamma(&mut self, gamma: f32) -> Result<(), Error> {
        self.set_display_params(DisplayParams {
            gamma: gamma,
            ..self.params
        })
    }

    pub fn set_tonemap(&mut self, tonemap: Tonemap) {
        self.params.tonemap = tonemap;
    }

    pub fn set_metric(&mut self, metric: Metric) {
        self.params.metric = metric;
    }

    pub fn set_clip_to_ldr(&mut self, clip: bool) {
        self.params.clip_to_ldr = clip;
    }

    //----------------------------------------------------------------
    // Pan and zoom.

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.transform.set_viewport(viewport);
    }

    pub fn translate(&mut self, delta: Vec2) {
        self.transform.translate(delta);
    }

    pub fn scale(&mut self, factor: f32, origin: Vec2) {
        self.transform.scale(factor, origin);
    }

    pub fn scroll(&mut self, amount: f32, origin: Vec2) {
        self.transform.scroll(amount, origin);
    }

    pub fn fit_image_to_screen(&mut self) {
        if let Some(ref image) = self.image {
            self.transform.fit_to_screen(image.dimensions());
        }
    }

    pub fn reset_transform(&mut self) {
        self.transform.reset();
    }

    //----------------------------------------------------------------
    // Statistics.

    /// The key statistics are currently memoized under, if an image is set.
    pub fn statistics_key(&self) -> Option<StatisticsKey> {
        let image = self.image.as_ref()?;
        let group = self.channel_group()?;
        Some(StatisticsKey::new(
            image,
            self.reference.as_deref(),
            &group.name,
            self.params.metric,
        ))
    }

    /// Statistics of what's displayed.
    ///
    /// Only the image, reference, channel group, and metric affect this,
    /// so e.g. exposure changes keep returning the same task.
    pub fn canvas_statistics(&mut self) -> Option<Task<Arc<CanvasStatistics>>> {
        let key = self.statistics_key()?;
        if let Some((ref current, ref task)) = self.statistics {
            if *current == key {
                return Some(task.clone());
            }
        }

        let image = self.image.as_ref()?;
        let task = self.statistics_cache.statistics(
            &self.job_queue,
            image,
            self.reference.as_ref(),
            &key.group,
            key.metric,
            STATISTICS_PRIORITY,
        );
        self.statistics = Some((key, task.clone()));
        Some(task)
    }

    //----------------------------------------------------------------
    // Pixel queries.

    /// The image pixel under a display position.
    pub fn image_coords(&self, position: Vec2) -> Result<(usize, usize), Error> {
        let image = self.image.as_ref().ok_or(Error::OutOfBounds)?;
        let (w, h) = image.dimensions();
        let p = self
            .transform
            .image_pixel_from_display_coordinate(position, (w, h))
            .floor();
        let inside = p.x >= 0.0 && p.y >= 0.0 && p.x < w as f32 && p.y < h as f32;
        if !p.is_finite() || !inside {
            return Err(Error::OutOfBounds);
        }
        Ok((p.x as usize, p.y as usize))
    }

    /// Values of the named channels at a display position.
    ///
    /// With a reference set, the metric is applied to color channels.
    /// Channels the image doesn't have read as zero.
    pub fn values_at_display_position(
        &self,
        position: Vec2,
        channel_names: &[&str],
    ) -> Result<Vec<f32>, Error> {
        let (x, y) = self.image_coords(position)?;
        let image = self.image.as_ref().ok_or(Error::OutOfBounds)?;

        Ok(channel_names
            .iter()
            .map(|&name| {
                let value = image.channel(name).map(|c| c.at(x, y)).unwrap_or(0.0);
                match self.reference {
                    Some(ref reference) if image_fmt::tail(name) != "A" => {
                        let ref_value = reference
                            .channel(name)
                            .map(|c| {
                                c.at(
                                    nearest_coordinate(x, image.width(), c.width()),
                                    nearest_coordinate(y, image.height(), c.height()),
                                )
                            })
                            .unwrap_or(0.0);
                        apply_metric(value, ref_value, self.params.metric)
                    }
                    _ => value,
                }
            })
            .collect())
    }

    //----------------------------------------------------------------
    // Whole-image output, at native resolution.

    // Color and alpha planes of the displayed group, metric applied.
    fn display_channels(&self) -> Result<(Vec<Channel>, Option<Channel>, (usize, usize)), Error> {
        let image = self
            .image
            .as_ref()
            .ok_or_else(|| Error::Export("no image to export".into()))?;
        let group = self
            .channel_group()
            .ok_or_else(|| Error::NotFound(self.requested_group.clone()))?;

        let channels = channels_from_images(
            image,
            self.reference.as_deref(),
            &group.name,
            self.params.metric,
        )?;
        let (alpha, color): (Vec<Channel>, Vec<Channel>) = channels
            .into_iter()
            .partition(|c| image_fmt::tail(c.name()) == "A");

        Ok((color, alpha.into_iter().next(), image.dimensions()))
    }

    /// Linear RGBA after exposure and offset, clipped to [0, 1] if clip
    /// to LDR is set.
    pub fn hdr_image_data(&self, divide_alpha: bool) -> Result<Vec<[f32; 4]>, Error> {
        let params = self.params;
        self.map_pixels(divide_alpha, move |rgb, alpha| {
            [params.adjust(rgb[0]), params.adjust(rgb[1]), params.adjust(rgb[2]), alpha]
        })
    }

    /// Display values after exposure, offset, and tonemapping.
    pub fn tonemapped_image_data(&self, divide_alpha: bool) -> Result<Vec<[f32; 4]>, Error> {
        let params = self.params;
        self.map_pixels(divide_alpha, move |rgb, alpha| {
            let mapped = params.display(rgb);
            [mapped[0], mapped[1], mapped[2], alpha]
        })
    }

    /// Tonemapped display values quantized to 8 bits.
    pub fn ldr_image_data(&self, divide_alpha: bool) -> Result<Vec<[u8; 4]>, Error> {
        let to_u8 = |v: f32| (v.max(0.0).min(1.0) * 255.0).round() as u8;
        Ok(self
            .tonemapped_image_data(divide_alpha)?
            .par_iter()
            .map(|p| [to_u8(p[0]), to_u8(p[1]), to_u8(p[2]), to_u8(p[3])])
            .collect())
    }

    // Runs `f` on every pixel's (rgb, alpha).
    fn map_pixels<F>(&self, divide_alpha: bool, f: F) -> Result<Vec<[f32; 4]>, Error>
    where
        F: Fn([f32; 3], f32) -> [f32; 4] + Sync + Send,
    {
        let (color, alpha, (w, h)) = self.display_channels()?;

        Ok((0..(w * h))
            .into_par_iter()
            .map(|i| {
                let sample = |n: usize| color.get(n).map(|c| c.eval(i));
                let rgb = match color.len() {
                    0 => [0.0; 3],
                    1 => {
                        let v = sample(0).unwrap_or(0.0);
                        [v, v, v]
                    }
                    2 => [sample(0).unwrap_or(0.0), sample(1).unwrap_or(0.0), 0.0],
                    _ => [
                        sample(0).unwrap_or(0.0),
                        sample(1).unwrap_or(0.0),
                        sample(2).unwrap_or(0.0),
                    ],
                };
                let a = alpha.as_ref().map(|c| c.eval(i)).unwrap_or(1.0);

                let rgb = if divide_alpha && a != 0.0 {
                    [rgb[0] / a, rgb[1] / a, rgb[2] / a]
                } else {
                    rgb
                };
                f(rgb, a)
            })
            .collect())
    }

    /// Writes the displayed image to a file, picking the format by
    /// extension: `.png` for tonemapped 8-bit, `.hdr` for linear.
    pub fn save_image(&self, path: &Path) -> Result<(), Error> {
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let (w, h) = self
            .image
            .as_ref()
            .map(|image| image.dimensions())
            .ok_or_else(|| Error::Export("no image to export".into()))?;

        match extension.as_str() {
            "png" => {
                let pixels = self.ldr_image_data(true)?;
                let bytes: Vec<u8> = pixels.iter().flatten().copied().collect();
                let out = BufWriter::new(File::create(path)?);
                image_fmt::write::write_png(out, &bytes, w, h)
                    .map_err(|e| Error::Export(e.to_string()))?;
            }
            "hdr" => {
                let pixels: Vec<[f32; 3]> = self
                    .hdr_image_data(true)?
                    .iter()
                    .map(|p| [p[0].max(0.0), p[1].max(0.0), p[2].max(0.0)])
                    .collect();
                let mut out = BufWriter::new(File::create(path)?);
                hdr::write_hdr(&mut out, &pixels, w, h, 1.0)?;
            }
            _ => {
                return Err(Error::Export(format!(
                    "unsupported file extension \"{}\", use .png or .hdr",
                    extension
                )));
            }
        }

        log::info!("Saved '{}'", path.display());
        Ok(())
    }
}
