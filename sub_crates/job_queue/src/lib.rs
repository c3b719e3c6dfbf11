//! A priority ordered background job queue.
//!
//! Jobs are handed to a `ScheduledThreadPool`, but the pool only decides
//! *when* a worker is free.  *Which* job a free worker runs is decided
//! here: the highest priority pending job, first-come-first-served among
//! equal priorities.
//!
//! Every job gets a `Task` handle that can be polled, waited on, or
//! canceled.

use std::{
    collections::{BinaryHeap, VecDeque},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Condvar, Mutex,
    },
};

use scheduled_thread_pool::ScheduledThreadPool;

pub struct JobQueue {
    runner: ScheduledThreadPool,
    job_status: Arc<Mutex<JobStatus>>,
}

impl JobQueue {
    /// A queue with one worker per available core.
    pub fn new() -> JobQueue {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        JobQueue::with_threads(threads)
    }

    pub fn with_threads(thread_count: usize) -> JobQueue {
        JobQueue {
            runner: ScheduledThreadPool::builder()
                .num_threads(thread_count.max(1))
                .thread_name_pattern("job_queue_{}")
                .build(),
            job_status: Arc::new(Mutex::new(JobStatus {
                pending: BinaryHeap::new(),
                running: Vec::new(),
                next_sequence: 0,
                job_progress: None,
                log: VecDeque::new(),
                update_fn: None,
            })),
        }
    }

    /// Sets a function that's called whenever a job finishes.
    ///
    /// Typically used to request a repaint of the UI.
    pub fn set_update_fn<F: Fn() + Send + Sync + 'static>(&self, update_fn: F) {
        self.job_status.lock().unwrap().update_fn = Some(Arc::new(update_fn));
    }

    /// Queues a job.  Higher `priority` values run first.
    pub fn add_job<T, F>(&self, name: &str, priority: i32, job: F) -> Task<T>
    where
        T: Send + 'static,
        F: FnOnce(&JobContext) -> T + Send + 'static,
    {
        let task = Task::pending();

        let slot = Arc::clone(&task.slot);
        let run: Box<dyn FnOnce(&JobContext) + Send> = Box::new(move |context| {
            let result = job(context);
            slot.finish(result);
        });

        {
            let mut job_status = self.job_status.lock().unwrap();
            let sequence = job_status.next_sequence;
            job_status.next_sequence += 1;
            job_status.pending.push(PendingJob {
                name: name.to_string(),
                priority: priority,
                sequence: sequence,
                control: Arc::clone(&task.slot) as Arc<dyn TaskControl>,
                run: run,
            });
        }

        // Each dispatch runs exactly one job, but not necessarily this one.
        let job_status = Arc::clone(&self.job_status);
        self.runner.execute(move || run_next_job(&job_status));

        task
    }

    pub fn progress(&self) -> Option<(String, f32)> {
        self.job_status.lock().unwrap().job_progress.clone()
    }

    /// Pending plus running jobs.
    pub fn job_count(&self) -> usize {
        let job_status = self.job_status.lock().unwrap();
        job_status.pending.len() + job_status.running.len()
    }

    /// Cancels every pending and running job.
    ///
    /// Pending jobs are skipped, running jobs have their results discarded.
    pub fn cancel_all_jobs(&self) {
        let job_status = self.job_status.lock().unwrap();
        for job in job_status.pending.iter() {
            job.control.cancel();
        }
        for (_, control) in job_status.running.iter() {
            control.cancel();
        }
    }

    pub fn log_count(&self) -> usize {
        self.job_status.lock().unwrap().log.len()
    }

    /// Index zero is the most recent entry.
    pub fn get_log(&self, index: usize) -> (String, LogLevel) {
        self.job_status.lock().unwrap().log[index].clone()
    }

    pub fn clear_log(&self) {
        self.job_status.lock().unwrap().log.clear()
    }

    pub fn log_error(&self, message: String) {
        self.job_status.lock().unwrap().log_error(message);
    }

    pub fn log_warning(&self, message: String) {
        self.job_status.lock().unwrap().log_warning(message);
    }

    pub fn log_note(&self, message: String) {
        self.job_status.lock().unwrap().log_note(message);
    }
}

impl Default for JobQueue {
    fn default() -> JobQueue {
        JobQueue::new()
    }
}

fn run_next_job(job_status: &Arc<Mutex<JobStatus>>) {
    let job = {
        let mut status = job_status.lock().unwrap();
        let job = match status.pending.pop() {
            Some(job) => job,
            None => return,
        };
        status.running.push((job.sequence, Arc::clone(&job.control)));
        job
    };

    let PendingJob {
        name,
        sequence,
        control,
        run,
        ..
    } = job;

    if !control.is_canceled() {
        let context = JobContext {
            job_status: job_status,
            control: &*control,
        };
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| run(&context)));
        if result.is_err() {
            log::error!("Job \"{}\" panicked", name);
            job_status
                .lock()
                .unwrap()
                .log_error(format!("ERROR: job \"{}\" panicked!", name));
            control.fail(JobError::Panicked);
        }
    }

    // Cleanup.
    let update_fn = {
        let mut status = job_status.lock().unwrap();
        status.running.retain(|(s, _)| *s != sequence);
        status.clear_progress();
        status.update_fn.clone()
    };
    if let Some(update_fn) = update_fn {
        update_fn();
    }
}

/// What a running job can see of its queue.
pub struct JobContext<'a> {
    job_status: &'a Mutex<JobStatus>,
    control: &'a dyn TaskControl,
}

impl<'a> JobContext<'a> {
    /// Long running jobs should check this now and then and bail out early.
    pub fn is_canceled(&self) -> bool {
        self.control.is_canceled()
    }

    pub fn set_progress(&self, text: String, ratio: f32) {
        self.job_status.lock().unwrap().job_progress = Some((text, ratio));
    }

    pub fn log_error(&self, message: String) {
        self.job_status.lock().unwrap().log_error(message);
    }

    pub fn log_warning(&self, message: String) {
        self.job_status.lock().unwrap().log_warning(message);
    }

    pub fn log_note(&self, message: String) {
        self.job_status.lock().unwrap().log_note(message);
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LogLevel {
    Error,
    Warning,
    Note,
}

struct JobStatus {
    pending: BinaryHeap<PendingJob>,
    running: Vec<(u64, Arc<dyn TaskControl>)>,
    next_sequence: u64,
    job_progress: Option<(String, f32)>,
    log: VecDeque<(String, LogLevel)>,
    update_fn: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl JobStatus {
    fn clear_progress(&mut self) {
        self.job_progress = None;
    }

    fn log_error(&mut self, message: String) {
        self.log.push_front((message, LogLevel::Error));
    }

    fn log_warning(&mut self, message: String) {
        self.log.push_front((message, LogLevel::Warning));
    }

    fn log_note(&mut self, message: String) {
        self.log.push_front((message, LogLevel::Note));
    }
}

struct PendingJob {
    name: String,
    priority: i32,
    sequence: u64,
    control: Arc<dyn TaskControl>,
    run: Box<dyn FnOnce(&JobContext) + Send>,
}

// Max-heap order: higher priority first, then lower sequence number.
impl Ord for PendingJob {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for PendingJob {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PendingJob {
    fn eq(&self, other: &Self) -> bool {
        self.sequence == other.sequence
    }
}

impl Eq for PendingJob {}

//-------------------------------------------------------------

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum JobError {
    /// The job panicked while running.
    Panicked,
    /// The job was canceled before it produced a result.
    Canceled,
    /// The result was already taken out of the task.
    Taken,
}

impl std::error::Error for JobError {}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobError::Panicked => write!(f, "Panicked: the job panicked while running."),
            JobError::Canceled => write!(f, "Canceled: the job was canceled."),
            JobError::Taken => write!(f, "Taken: the job's result was already taken."),
        }
    }
}

/// Handle to the eventual result of a job.
///
/// Clones refer to the same result.
pub struct Task<T> {
    slot: Arc<TaskSlot<T>>,
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Task {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> std::fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("ready", &self.is_ready())
            .field("canceled", &self.is_canceled())
            .finish()
    }
}

enum TaskState<T> {
    Pending,
    Finished(T),
    Failed(JobError),
}

struct TaskSlot<T> {
    state: Mutex<TaskState<T>>,
    ready: Condvar,
    canceled: AtomicBool,
}

impl<T> TaskSlot<T> {
    fn resolve(&self, state: TaskState<T>) {
        let mut current = self.state.lock().unwrap();
        // First resolution wins.
        if let TaskState::Pending = *current {
            *current = state;
            self.ready.notify_all();
        }
    }

    fn finish(&self, value: T) {
        self.resolve(TaskState::Finished(value));
    }
}

trait TaskControl: Send + Sync {
    fn cancel(&self);
    fn is_canceled(&self) -> bool;
    fn fail(&self, error: JobError);
}

impl<T: Send> TaskControl for TaskSlot<T> {
    fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
        self.resolve(TaskState::Failed(JobError::Canceled));
    }

    fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    fn fail(&self, error: JobError) {
        self.resolve(TaskState::Failed(error));
    }
}

impl<T> Task<T> {
    fn pending() -> Task<T> {
        Task {
            slot: Arc::new(TaskSlot {
                state: Mutex::new(TaskState::Pending),
                ready: Condvar::new(),
                canceled: AtomicBool::new(false),
            }),
        }
    }

    /// A task that is already finished with `value`.
    pub fn ready(value: T) -> Task<T> {
        let task = Task::pending();
        task.slot.finish(value);
        task
    }

    pub fn is_ready(&self) -> bool {
        match *self.slot.state.lock().unwrap() {
            TaskState::Pending => false,
            _ => true,
        }
    }

    /// Cancels the task.  A job that already finished is unaffected.
    pub fn cancel(&self) {
        self.slot.canceled.store(true, Ordering::SeqCst);
        self.slot.resolve(TaskState::Failed(JobError::Canceled));
    }

    pub fn is_canceled(&self) -> bool {
        self.slot.canceled.load(Ordering::SeqCst)
    }

    /// Takes the result out if the job is done, without blocking.
    pub fn try_take(&self) -> Option<Result<T, JobError>> {
        let mut state = self.slot.state.lock().unwrap();
        take_state(&mut state)
    }

    /// Blocks until the job is done, without touching its result.
    pub fn wait_ready(&self) {
        let mut state = self.slot.state.lock().unwrap();
        while let TaskState::Pending = *state {
            state = self.slot.ready.wait(state).unwrap();
        }
    }

    /// Blocks until the job is done, then takes its result out.
    pub fn wait_take(&self) -> Result<T, JobError> {
        let mut state = self.slot.state.lock().unwrap();
        loop {
            if let Some(result) = take_state(&mut state) {
                return result;
            }
            state = self.slot.ready.wait(state).unwrap();
        }
    }
}

impl<T: Clone> Task<T> {
    /// A copy of the result if the job is done, without blocking.
    pub fn try_get(&self) -> Option<Result<T, JobError>> {
        let state = self.slot.state.lock().unwrap();
        get_state(&state)
    }

    /// Blocks until the job is done and returns a copy of its result.
    pub fn wait(&self) -> Result<T, JobError> {
        let mut state = self.slot.state.lock().unwrap();
        loop {
            if let Some(result) = get_state(&state) {
                return result;
            }
            state = self.slot.ready.wait(state).unwrap();
        }
    }
}

fn take_state<T>(state: &mut TaskState<T>) -> Option<Result<T, JobError>> {
    match std::mem::replace(state, TaskState::Failed(JobError::Taken)) {
        TaskState::Pending => {
            *state = TaskState::Pending;
            None
        }
        TaskState::Finished(value) => Some(Ok(value)),
        TaskState::Failed(e) => {
            *state = TaskState::Failed(e);
            Some(Err(e))
        }
    }
}

fn get_state<T: Clone>(state: &TaskState<T>) -> Option<Result<T, JobError>> {
    match state {
        TaskState::Pending => None,
        TaskState::Finished(value) => Some(Ok(value.clone())),
        TaskState::Failed(e) => Some(Err(*e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    // Occupies the queue's only worker until the returned sender is used.
    fn block(queue: &JobQueue) -> (mpsc::Sender<()>, Task<()>) {
        let (tx, rx) = mpsc::channel::<()>();
        let task = queue.add_job("block", i32::MAX, move |_| {
            rx.recv().unwrap();
        });
        (tx, task)
    }

    fn recorded_order(priorities: &[(&'static str, i32)]) -> Vec<&'static str> {
        let queue = JobQueue::with_threads(1);
        let order = Arc::new(Mutex::new(Vec::new()));
        let (release, blocker) = block(&queue);

        let tasks: Vec<_> = priorities
            .iter()
            .map(|&(name, priority)| {
                let order = Arc::clone(&order);
                queue.add_job(name, priority, move |_| order.lock().unwrap().push(name))
            })
            .collect();

        release.send(()).unwrap();
        blocker.wait_take().unwrap();
        for task in tasks.iter() {
            task.wait_take().unwrap();
        }

        let order = order.lock().unwrap().clone();
        order
    }

    #[test]
    fn higher_priority_first() {
        assert_eq!(
            recorded_order(&[("low", 0), ("high", 10), ("mid", 5), ("negative", -3)]),
            vec!["high", "mid", "low", "negative"]
        );
    }

    #[test]
    fn equal_priority_is_fifo() {
        assert_eq!(
            recorded_order(&[("a", 1), ("b", 1), ("c", 1), ("d", 2)]),
            vec!["d", "a", "b", "c"]
        );
    }

    #[test]
    fn results() {
        let queue = JobQueue::with_threads(2);
        let task = queue.add_job("sum", 0, |_| (1..=10).sum::<i32>());
        assert_eq!(task.wait(), Ok(55));
        assert!(task.is_ready());
        assert_eq!(task.try_get(), Some(Ok(55)));
        assert_eq!(task.try_take(), Some(Ok(55)));
        assert_eq!(task.try_take(), Some(Err(JobError::Taken)));

        let ready = Task::ready("done");
        assert!(ready.is_ready());
        assert_eq!(ready.clone().wait_take(), Ok("done"));
    }

    #[test]
    fn cancel_before_start_skips_job() {
        let queue = JobQueue::with_threads(1);
        let (release, blocker) = block(&queue);

        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = Arc::clone(&ran);
        let task = queue.add_job("skipped", 0, move |_| ran2.store(true, Ordering::SeqCst));
        task.cancel();
        assert!(task.is_canceled());
        assert_eq!(task.try_take(), Some(Err(JobError::Canceled)));

        let after = queue.add_job("after", 0, |_| 1);
        release.send(()).unwrap();
        blocker.wait_take().unwrap();
        assert_eq!(after.wait_take(), Ok(1));
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn cancel_while_running_discards_result() {
        let queue = JobQueue::with_threads(1);
        let (started_tx, started_rx) = mpsc::channel::<()>();
        let (release, rx) = mpsc::channel::<()>();
        let task = queue.add_job("running", 0, move |context| {
            started_tx.send(()).unwrap();
            rx.recv().unwrap();
            context.is_canceled()
        });

        started_rx.recv().unwrap();
        queue.cancel_all_jobs();
        release.send(()).unwrap();

        assert_eq!(task.wait_take(), Err(JobError::Canceled));
    }

    #[test]
    fn panic_is_isolated() {
        let queue = JobQueue::with_threads(1);
        let bad: Task<u32> = queue.add_job("bad", 0, |_| panic!("decoder exploded"));
        let good = queue.add_job("good", 0, |_| 7u32);

        assert_eq!(bad.wait_take(), Err(JobError::Panicked));
        assert_eq!(good.wait_take(), Ok(7));
        assert!(queue.log_count() >= 1);
        assert_eq!(queue.get_log(0).1, LogLevel::Error);
        assert!(queue.get_log(0).0.contains("bad"));
    }

    #[test]
    fn update_fn_called() {
        let queue = JobQueue::with_threads(1);
        let (tx, rx) = mpsc::channel::<()>();
        let tx = Mutex::new(tx);
        queue.set_update_fn(move || {
            let _ = tx.lock().unwrap().send(());
        });
        queue.add_job("job", 0, |_| ()).wait_take().unwrap();
        rx.recv_timeout(std::time::Duration::from_secs(10)).unwrap();
    }

    #[test]
    fn workers_are_named() {
        let queue = JobQueue::with_threads(0);
        let name = queue
            .add_job("name", 0, |_| std::thread::current().name().map(String::from))
            .wait_take()
            .unwrap()
            .unwrap();
        assert!(name.starts_with("job_queue_"));
    }
}
