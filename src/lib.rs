//! Core of an HDR image viewer: loading, statistics, and the display
//! pipeline that turns float channel data into pixels.

pub mod canvas;
pub mod error;
pub mod image;
pub mod loader;
pub mod selection;
pub mod statistics;
pub mod tonemap;
pub mod transform;

pub use crate::{
    canvas::Canvas,
    error::Error,
    image::{ChannelGroup, Image},
    loader::{BackgroundImagesLoader, ImageAddition},
    statistics::{CanvasStatistics, StatisticsCache, StatisticsKey, NUM_BINS},
    tonemap::{DisplayParams, Metric, Tonemap},
    transform::{Transform, Viewport},
};
