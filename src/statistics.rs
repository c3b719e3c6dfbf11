//! Lazily computed, memoized image statistics.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, Weak,
    },
};

use rayon::prelude::*;

use job_queue::{JobQueue, Task};

use crate::{image::Image, selection::channels_from_images, tonemap::Metric};

/// Histogram buckets per channel, independent of image size.
pub const NUM_BINS: usize = 400;

#[derive(Debug, Clone, PartialEq)]
pub struct CanvasStatistics {
    pub mean: f32,
    pub minimum: f32,
    pub maximum: f32,
    /// `n_channels * NUM_BINS` bucket weights, channel after channel.  Each
    /// channel's buckets sum to one.
    pub histogram: Vec<f32>,
    /// Color channels only, alpha isn't counted.
    pub n_channels: usize,
    /// The bucket that holds 0.0.
    pub histogram_zero: usize,
}

impl CanvasStatistics {
    pub fn channel_histogram(&self, channel: usize) -> &[f32] {
        &self.histogram[(channel * NUM_BINS)..((channel + 1) * NUM_BINS)]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatisticsKey {
    pub image: usize,
    pub reference: Option<usize>,
    pub group: String,
    pub metric: Metric,
}

impl StatisticsKey {
    pub fn new(image: &Image, reference: Option<&Image>, group: &str, metric: Metric) -> StatisticsKey {
        StatisticsKey {
            image: image.id(),
            reference: reference.map(|r| r.id()),
            group: group.into(),
            metric: metric,
        }
    }
}

struct CacheEntry {
    image: Weak<Image>,
    reference: Option<Weak<Image>>,
    task: Task<Arc<CanvasStatistics>>,
}

/// Memoizes statistics per `StatisticsKey`.
///
/// Requests for a key that's already known get the same task handle back,
/// so each key is computed at most once.
pub struct StatisticsCache {
    entries: Mutex<HashMap<StatisticsKey, CacheEntry>>,
    computations: Arc<AtomicUsize>,
}

impl StatisticsCache {
    pub fn new() -> StatisticsCache {
        StatisticsCache {
            entries: Mutex::new(HashMap::new()),
            computations: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn statistics(
        &self,
        job_queue: &JobQueue,
        image: &Arc<Image>,
        reference: Option<&Arc<Image>>,
        group: &str,
        metric: Metric,
        priority: i32,
    ) -> Task<Arc<CanvasStatistics>> {
        let key = StatisticsKey::new(image, reference.map(|r| &**r), group, metric);

        // Lookup and insertion under the same lock.  Failed (canceled or
        // panicked) entries are replaced by a fresh computation.
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get(&key) {
            match entry.task.try_get() {
                Some(Err(e)) => {
                    log::debug!("Recomputing statistics of {}: {}", image.short_name(), e)
                }
                _ => return entry.task.clone(),
            }
        }

        let image_ref = Arc::clone(image);
        let reference_ref = reference.map(Arc::clone);
        let group_name = group.to_string();
        let computations = Arc::clone(&self.computations);
        let task = job_queue.add_job(
            &format!("Statistics of {}", image.short_name()),
            priority,
            move |_| {
                computations.fetch_add(1, Ordering::SeqCst);
                let stats = compute_canvas_statistics(
                    &image_ref,
                    reference_ref.as_deref(),
                    &group_name,
                    metric,
                );
                Arc::new(stats)
            },
        );

        entries.insert(
            key,
            CacheEntry {
                image: Arc::downgrade(image),
                reference: reference.map(Arc::downgrade),
                task: task.clone(),
            },
        );

        task
    }

    /// Drops entries whose image or reference no longer exists.
    pub fn prune(&self) {
        self.entries.lock().unwrap().retain(|_, entry| {
            entry.image.strong_count() > 0
                && entry
                    .reference
                    .as_ref()
                    .map(|r| r.strong_count() > 0)
                    .unwrap_or(true)
        });
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many statistics computations have been started so far.
    pub fn computation_count(&self) -> usize {
        self.computations.load(Ordering::SeqCst)
    }
}

impl Default for StatisticsCache {
    fn default() -> StatisticsCache {
        StatisticsCache::new()
    }
}

#[inline]
fn symlog(v: f32) -> f32 {
    v.signum() * v.abs().ln_1p()
}

/// Computes the statistics of one channel group.
///
/// Falls back to the image's first group if `group` doesn't exist.
/// Non-finite samples are ignored.
pub fn compute_canvas_statistics(
    image: &Image,
    reference: Option<&Image>,
    group: &str,
    metric: Metric,
) -> CanvasStatistics {
    let channels = match crate::selection::resolve_group(image, group) {
        Some(group) => channels_from_images(image, reference, &group.name, metric)
            .unwrap_or_else(|e| {
                log::warn!("Statistics of {}: {}", image.name(), e);
                Vec::new()
            }),
        None => Vec::new(),
    };
    let channels: Vec<_> = channels
        .iter()
        .filter(|c| image_fmt::tail(c.name()) != "A")
        .collect();

    // Mean, min, and max over all color channels together.
    let (sum, count, minimum, maximum) = channels
        .par_iter()
        .map(|chan| {
            chan.data()
                .par_iter()
                .filter(|v| v.is_finite())
                .fold(
                    || (0.0f64, 0usize, f32::INFINITY, f32::NEG_INFINITY),
                    |(sum, n, lo, hi), &v| (sum + v as f64, n + 1, lo.min(v), hi.max(v)),
                )
                .reduce(
                    || (0.0f64, 0usize, f32::INFINITY, f32::NEG_INFINITY),
                    merge_accumulators,
                )
        })
        .reduce(
            || (0.0f64, 0usize, f32::INFINITY, f32::NEG_INFINITY),
            merge_accumulators,
        );

    let (mean, minimum, maximum) = if count > 0 {
        ((sum / count as f64) as f32, minimum, maximum)
    } else {
        (0.0, 0.0, 0.0)
    };

    // Histogram with signed-log bucketing.
    let lo = symlog(minimum);
    let hi = symlog(maximum);
    let bucket = |v: f32| -> usize {
        if hi > lo {
            let t = (symlog(v) - lo) / (hi - lo);
            // Float to int casts saturate, so t < 0 lands in bucket zero.
            ((t * NUM_BINS as f32) as usize).min(NUM_BINS - 1)
        } else {
            0
        }
    };

    let histogram: Vec<f32> = channels
        .par_iter()
        .flat_map_iter(|chan| {
            let mut counts = vec![0usize; NUM_BINS];
            let mut total = 0usize;
            for &v in chan.data().iter().filter(|v| v.is_finite()) {
                counts[bucket(v)] += 1;
                total += 1;
            }
            let norm = if total > 0 { 1.0 / total as f32 } else { 0.0 };
            counts.into_iter().map(move |n| n as f32 * norm)
        })
        .collect();

    CanvasStatistics {
        mean: mean,
        minimum: minimum,
        maximum: maximum,
        histogram: histogram,
        n_channels: channels.len(),
        histogram_zero: bucket(0.0),
    }
}

fn merge_accumulators(
    a: (f64, usize, f32, f32),
    b: (f64, usize, f32, f32),
) -> (f64, usize, f32, f32) {
    (a.0 + b.0, a.1 + b.1, a.2.min(b.2), a.3.max(b.3))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image_fmt::{Channel, ChannelSelector, ImageData};
    use std::path::Path;

    fn image(dimensions: (usize, usize), channels: Vec<(&str, Vec<f32>)>) -> Arc<Image> {
        Arc::new(Image::new(
            Path::new("stats.exr"),
            ChannelSelector::all(),
            ImageData::new(
                dimensions,
                channels
                    .into_iter()
                    .map(|(n, d)| Channel::new(n, dimensions, d))
                    .collect(),
                true,
            ),
        ))
    }

    #[test]
    fn two_by_two() {
        let img = image((2, 2), vec![("Y", vec![0.0, 0.5, 1.0, 2.0])]);
        let stats = compute_canvas_statistics(&img, None, "Y", Metric::Error);
        assert_eq!(stats.n_channels, 1);
        assert_eq!(stats.minimum, 0.0);
        assert_eq!(stats.maximum, 2.0);
        assert!((stats.mean - 0.875).abs() < 1e-6);
        assert_eq!(stats.histogram.len(), NUM_BINS);
        assert_eq!(stats.histogram_zero, 0);
        assert_eq!(stats.histogram[0], 0.25);
        assert_eq!(stats.histogram[NUM_BINS - 1], 0.25);
        let total: f32 = stats.histogram.iter().sum();
        assert!((total - 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_bucket_with_negative_values() {
        let img = image((3, 1), vec![("Y", vec![-3.0, 0.0, 3.0])]);
        let stats = compute_canvas_statistics(&img, None, "Y", Metric::Error);
        assert_eq!(stats.histogram_zero, NUM_BINS / 2);
        assert_eq!(stats.histogram[NUM_BINS / 2], 1.0 / 3.0);
    }

    #[test]
    fn alpha_and_non_finite_excluded() {
        let img = image(
            (2, 1),
            vec![
                ("R", vec![1.0, f32::NAN]),
                ("G", vec![3.0, f32::INFINITY]),
                ("B", vec![5.0, 5.0]),
                ("A", vec![100.0, 100.0]),
            ],
        );
        let stats = compute_canvas_statistics(&img, None, "R,G,B,A", Metric::Error);
        assert_eq!(stats.n_channels, 3);
        assert_eq!(stats.histogram.len(), 3 * NUM_BINS);
        assert_eq!(stats.maximum, 5.0);
        assert_eq!(stats.minimum, 1.0);
        assert!((stats.mean - 3.5).abs() < 1e-6);
        for c in 0..3 {
            let total: f32 = stats.channel_histogram(c).iter().sum();
            assert!((total - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn constant_image() {
        let img = image((2, 1), vec![("Y", vec![0.5, 0.5])]);
        let stats = compute_canvas_statistics(&img, None, "Y", Metric::Error);
        assert_eq!(stats.minimum, 0.5);
        assert_eq!(stats.maximum, 0.5);
        assert_eq!(stats.histogram[0], 1.0);
        assert_eq!(stats.histogram_zero, 0);
    }

    #[test]
    fn with_reference() {
        let img = image((2, 1), vec![("Y", vec![1.0, 2.0])]);
        let reference = image((1, 1), vec![("Y", vec![1.0])]);
        let stats = compute_canvas_statistics(&img, Some(&reference), "Y", Metric::SquaredError);
        assert_eq!(stats.minimum, 0.0);
        assert_eq!(stats.maximum, 1.0);
        assert!((stats.mean - 0.5).abs() < 1e-6);
    }

    #[test]
    fn concurrent_requests_compute_once() {
        let queue = Arc::new(JobQueue::with_threads(4));
        let cache = Arc::new(StatisticsCache::new());
        let img = image((64, 64), vec![("Y", vec![0.25; 64 * 64])]);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let cache = Arc::clone(&cache);
                let img = Arc::clone(&img);
                std::thread::spawn(move || {
                    cache
                        .statistics(&queue, &img, None, "Y", Metric::Error, 0)
                        .wait()
                        .unwrap()
                })
            })
            .collect();

        let results: Vec<Arc<CanvasStatistics>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        for r in results.iter() {
            assert!(Arc::ptr_eq(r, &results[0]));
        }
        assert_eq!(cache.computation_count(), 1);
        assert_eq!(cache.len(), 1);

        // Adding a reference makes it a different key.
        let other = image((1, 1), vec![("Y", vec![0.0])]);
        cache
            .statistics(&queue, &img, Some(&other), "Y", Metric::Error, 0)
            .wait()
            .unwrap();
        assert_eq!(cache.computation_count(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn failed_entries_are_recomputed() {
        let queue = JobQueue::with_threads(1);
        let cache = StatisticsCache::new();
        let img = image((2, 1), vec![("Y", vec![1.0, 3.0])]);

        // Occupy the only worker so the statistics job stays pending.
        let (started_tx, started_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        queue.add_job("block", 100, move |_| {
            started_tx.send(()).unwrap();
            release_rx.recv().ok();
        });
        started_rx.recv().unwrap();

        let first = cache.statistics(&queue, &img, None, "Y", Metric::Error, 0);
        queue.cancel_all_jobs();
        release_tx.send(()).unwrap();
        assert_eq!(first.wait(), Err(job_queue::JobError::Canceled));
        assert_eq!(cache.computation_count(), 0);

        let again = cache.statistics(&queue, &img, None, "Y", Metric::Error, 0);
        let stats = again.wait().unwrap();
        assert_eq!(stats.maximum, 3.0);
        assert_eq!(cache.computation_count(), 1);
        assert_eq!(cache.len(), 1);

        // A successful entry is kept.
        let third = cache.statistics(&queue, &img, None, "Y", Metric::Error, 0);
        assert!(Arc::ptr_eq(&third.wait().unwrap(), &stats));
        assert_eq!(cache.computation_count(), 1);
    }

    #[test]
    fn pruning() {
        let queue = JobQueue::with_threads(1);
        let cache = StatisticsCache::new();
        let img = image((1, 1), vec![("Y", vec![1.0])]);
        let reference = image((1, 1), vec![("Y", vec![1.0])]);

        cache.statistics(&queue, &img, None, "Y", Metric::Error, 0).wait().unwrap();
        cache
            .statistics(&queue, &img, Some(&reference), "Y", Metric::Error, 0)
            .wait()
            .unwrap();
        assert_eq!(cache.len(), 2);

        drop(reference);
        cache.prune();
        assert_eq!(cache.len(), 1);

        drop(img);
        cache.prune();
        assert!(cache.is_empty());
    }
}
