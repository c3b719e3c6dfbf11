//! Background image loading.

use std::{
    collections::VecDeque,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Instant,
};

use image_fmt::{ChannelSelector, LoadError, ReadSeek};
use job_queue::{JobContext, JobError, JobQueue, Task};

use crate::{
    image::{next_image_id, Image},
    Error,
};

pub type LoadResult = Result<Arc<Image>, LoadError>;

/// True if any decoder recognizes the stream.  The stream position is
/// left unchanged.
pub fn can_load(reader: &mut dyn ReadSeek) -> bool {
    image_fmt::can_load(reader)
}

/// Decodes an image on the calling thread.
pub fn try_load_image(
    id: usize,
    reader: &mut dyn ReadSeek,
    path: &Path,
    selector: &ChannelSelector,
) -> Result<Image, LoadError> {
    let start = Instant::now();

    let (mut data, decoder_name) = image_fmt::load(reader, selector)?;
    data.multiply_alpha();

    let image = Image::with_id(id, path, selector.clone(), data);
    log::info!(
        "Loaded '{}' via {} after {:.3} seconds",
        image.name(),
        decoder_name,
        start.elapsed().as_secs_f32()
    );

    Ok(image)
}

// Everything that happens on the worker thread for one load.
fn load_job(
    context: &JobContext,
    id: usize,
    reader: &mut dyn ReadSeek,
    path: &Path,
    selector: &ChannelSelector,
) -> LoadResult {
    match try_load_image(id, reader, path, selector) {
        Ok(image) => {
            for warning in image.data().warnings.iter() {
                log::warn!("{}: {}", image.name(), warning);
                context.log_warning(format!("{}: {}", image.name(), warning));
            }
            Ok(Arc::new(image))
        }
        Err(e) => {
            log::error!("Could not load '{}': {}", path.display(), e);
            context.log_error(format!("Could not load '{}': {}", path.display(), e));
            Err(e)
        }
    }
}

/// Queues decoding of `reader` on the job queue.
pub fn load<R>(
    job_queue: &JobQueue,
    reader: R,
    path: &Path,
    selector: ChannelSelector,
    priority: i32,
) -> Task<LoadResult>
where
    R: ReadSeek + Send + 'static,
{
    load_with_id(job_queue, next_image_id(), reader, path, selector, priority)
}

fn load_with_id<R>(
    job_queue: &JobQueue,
    id: usize,
    mut reader: R,
    path: &Path,
    selector: ChannelSelector,
    priority: i32,
) -> Task<LoadResult>
where
    R: ReadSeek + Send + 'static,
{
    let path = path.to_path_buf();
    job_queue.add_job(&format!("Load {}", path.display()), priority, move |context| {
        load_job(context, id, &mut reader, &path, &selector)
    })
}

/// Like `load()`, but opens the file on the worker thread.
pub fn load_file(
    job_queue: &JobQueue,
    path: &Path,
    selector: ChannelSelector,
    priority: i32,
) -> Task<LoadResult> {
    load_file_with_id(job_queue, next_image_id(), path, selector, priority)
}

fn load_file_with_id(
    job_queue: &JobQueue,
    id: usize,
    path: &Path,
    selector: ChannelSelector,
    priority: i32,
) -> Task<LoadResult> {
    let path = path.to_path_buf();
    job_queue.add_job(&format!("Load {}", path.display()), priority, move |context| {
        let mut reader = match File::open(&path) {
            Ok(file) => BufReader::new(file),
            Err(e) => {
                context.log_error(format!("Could not open '{}': {}", path.display(), e));
                return Err(LoadError::from(e));
            }
        };
        load_job(context, id, &mut reader, &path, &selector)
    })
}

/// A finished background load.
#[derive(Debug)]
pub struct ImageAddition {
    pub path: PathBuf,
    /// Whether the image should become the displayed image.
    pub should_select: bool,
    pub result: Result<Arc<Image>, Error>,
}

struct PendingLoad {
    path: PathBuf,
    should_select: bool,
    task: Task<LoadResult>,
}

/// Loads files in the background, earliest requests first.
pub struct BackgroundImagesLoader {
    job_queue: Arc<JobQueue>,
    pending: Mutex<VecDeque<PendingLoad>>,
}

impl BackgroundImagesLoader {
    pub fn new(job_queue: Arc<JobQueue>) -> BackgroundImagesLoader {
        BackgroundImagesLoader {
            job_queue: job_queue,
            pending: Mutex::new(VecDeque::new()),
        }
    }

    /// Queues a file for loading and returns the id the image will have.
    pub fn enqueue(&self, path: &Path, selector: ChannelSelector, should_select: bool) -> usize {
        let id = next_image_id();
        // Earlier images have smaller ids and thus higher priority.
        let priority = -(id.min(i32::MAX as usize) as i32);
        let task = load_file_with_id(&self.job_queue, id, path, selector, priority);

        self.pending.lock().unwrap().push_back(PendingLoad {
            path: path.to_path_buf(),
            should_select: should_select,
            task: task,
        });

        id
    }

    /// Returns the loads that have finished, in the order they were
    /// queued, without blocking.
    pub fn poll(&self) -> Vec<ImageAddition> {
        let mut pending = self.pending.lock().unwrap();
        let mut finished = Vec::new();
        let mut still_pending = VecDeque::new();
        for load in pending.drain(..) {
            if load.task.is_ready() {
                if let Some(addition) = finish(load) {
                    finished.push(addition);
                }
            } else {
                still_pending.push_back(load);
            }
        }
        *pending = still_pending;
        finished
    }

    /// Blocks until every queued load has finished.
    pub fn wait_all(&self) -> Vec<ImageAddition> {
        let loads: Vec<PendingLoad> = self.pending.lock().unwrap().drain(..).collect();
        loads
            .into_iter()
            .filter_map(|load| {
                load.task.wait_ready();
                finish(load)
            })
            .collect()
    }

    /// Supersedes every pending load.  Their results are discarded.
    pub fn cancel_all(&self) {
        for load in self.pending.lock().unwrap().drain(..) {
            load.task.cancel();
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

// `None` for canceled loads.
fn finish(load: PendingLoad) -> Option<ImageAddition> {
    let result = match load.task.try_take()? {
        Ok(Ok(image)) => Ok(image),
        Ok(Err(e)) => Err(Error::Load(e)),
        Err(JobError::Canceled) => return None,
        Err(e) => Err(Error::Job(e)),
    };
    Some(ImageAddition {
        path: load.path,
        should_select: load.should_select,
        result: result,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let mut bytes = Vec::new();
        image_fmt::write::write_png(
            &mut bytes,
            &[255, 255, 255, 255, 255, 255, 255, 0, 0, 0, 0, 128, 255, 0, 0, 255],
            2,
            2,
        )
        .unwrap();
        bytes
    }

    #[test]
    fn sniffing() {
        let mut cursor = Cursor::new(png_bytes());
        assert!(can_load(&mut cursor));
        assert_eq!(cursor.position(), 0);
        assert!(!can_load(&mut Cursor::new(b"nope".to_vec())));
    }

    #[test]
    fn loads_and_premultiplies() {
        let queue = JobQueue::with_threads(2);
        let task = load(
            &queue,
            Cursor::new(png_bytes()),
            Path::new("mem.png"),
            ChannelSelector::all(),
            0,
        );
        let image = task.wait_take().unwrap().unwrap();

        assert_eq!(image.dimensions(), (2, 2));
        assert_eq!(image.name(), "mem.png");
        assert!(image.data().has_premultiplied_alpha);
        assert_eq!(image.channel_groups()[0].name, "R,G,B,A");

        // Straight alpha white at alpha 0 becomes black.
        assert_eq!(image.channel("R").unwrap().at(1, 0), 0.0);
        assert_eq!(image.channel("R").unwrap().at(0, 0), 1.0);
        assert_eq!(image.channel("A").unwrap().at(1, 0), 0.0);
    }

    #[test]
    fn failures_are_values() {
        let queue = JobQueue::with_threads(1);
        let task = load(
            &queue,
            Cursor::new(b"not an image at all".to_vec()),
            Path::new("bad.bin"),
            ChannelSelector::all(),
            0,
        );
        assert!(matches!(task.wait_take(), Ok(Err(LoadError::UnknownFormat))));
        assert_eq!(queue.get_log(0).1, job_queue::LogLevel::Error);

        let missing = load_file(
            &queue,
            Path::new("/this/file/does/not/exist.exr"),
            ChannelSelector::all(),
            0,
        );
        assert!(matches!(missing.wait_take(), Ok(Err(LoadError::IO(_)))));
    }

    #[test]
    fn background_loader() {
        let dir = std::env::temp_dir().join(format!("hdr_view_loader_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let good = dir.join("good.png");
        std::fs::write(&good, png_bytes()).unwrap();
        let bad = dir.join("bad.png");
        std::fs::write(&bad, b"garbage").unwrap();

        let loader = BackgroundImagesLoader::new(Arc::new(JobQueue::with_threads(2)));
        let first = loader.enqueue(&good, ChannelSelector::all(), true);
        let second = loader.enqueue(&bad, ChannelSelector::all(), false);
        assert!(second > first);

        let additions = loader.wait_all();
        assert_eq!(additions.len(), 2);
        assert_eq!(additions[0].path, good);
        assert!(additions[0].should_select);
        assert_eq!(additions[0].result.as_ref().unwrap().id(), first);
        assert!(matches!(additions[1].result, Err(Error::Load(_))));
        assert_eq!(loader.pending_count(), 0);
        assert!(loader.poll().is_empty());

        loader.enqueue(&good, ChannelSelector::all(), false);
        loader.cancel_all();
        assert_eq!(loader.pending_count(), 0);
        assert!(loader.poll().is_empty());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
