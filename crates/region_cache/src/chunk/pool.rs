//! # Background Worker Pool
//!
//! A small bounded thread pool for column enumeration jobs.
//!
//! - Workers are spawned lazily when a job is submitted and no worker is
//!   idle, up to `max_threads`.
//! - Workers above `min_threads` exit after sitting idle for `keep_alive`.
//! - [`WorkerPool::shutdown_now`] cancels: queued jobs are discarded and
//!   running jobs observe their [`CancelToken`].
//! - [`WorkerPool::shutdown`] drains: queued and running jobs finish, the
//!   caller waits up to a timeout.
//! - [`WorkerPool::cancel`] followed by [`WorkerPool::wait`] cancels like
//!   `shutdown_now` and lets the caller wait, later, for running jobs to stop.
//!
//! Dropping a pool that was not shut down behaves like `shutdown_now`.

use crate::config::CacheConfig;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// A unit of background work. Long jobs should poll the token between steps.
pub type Job = Box<dyn FnOnce(&CancelToken) + Send + 'static>;

/// Cooperative cancellation flag shared by a pool and its jobs.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Pool sizing and naming.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub min_threads: usize,
    pub max_threads: usize,
    pub keep_alive: Duration,
    pub thread_name: String,
}

impl From<&CacheConfig> for PoolSettings {
    fn from(config: &CacheConfig) -> Self {
        Self {
            min_threads: config.min_threads,
            max_threads: config.max_threads.max(1),
            keep_alive: config.keep_alive(),
            thread_name: config.thread_name.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct Workers {
    live: usize,
    idle: usize,
    spawned: usize,
}

impl Workers {
    fn retire(&mut self) {
        self.live -= 1;
        self.idle -= 1;
    }
}

struct Shared {
    settings: PoolSettings,
    workers: Mutex<Workers>,
    drained: Condvar,
    receiver: Receiver<Job>,
    token: CancelToken,
}

/// Bounded pool of background threads.
pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    shared: Arc<Shared>,
}

impl WorkerPool {
    pub fn new(settings: PoolSettings) -> Self {
        let (sender, receiver) = channel::unbounded();
        Self {
            sender: Some(sender),
            shared: Arc::new(Shared {
                settings,
                workers: Mutex::new(Workers::default()),
                drained: Condvar::new(),
                receiver,
                token: CancelToken::new(),
            }),
        }
    }

    /// Queues a job, starting a worker if none is idle and the bound allows.
    pub fn submit(&self, job: Job) {
        let Some(sender) = &self.sender else {
            return;
        };

        let mut workers = self.shared.workers.lock();
        if sender.send(job).is_err() {
            return;
        }
        if workers.idle == 0 && workers.live < self.shared.settings.max_threads {
            spawn_worker(&self.shared, &mut workers);
        }
    }

    /// Number of worker threads currently alive.
    pub fn live_workers(&self) -> usize {
        self.shared.workers.lock().live
    }

    /// Number of jobs waiting for a worker.
    pub fn queued(&self) -> usize {
        self.shared.receiver.len()
    }

    /// Stops accepting work, discards queued jobs and signals running jobs to
    /// stop. Does not wait. Returns the number of discarded jobs.
    pub fn shutdown_now(mut self) -> usize {
        self.abort()
    }

    /// Same as [`WorkerPool::shutdown_now`], keeping the pool around so the
    /// caller can later wait for its workers with [`WorkerPool::wait`].
    pub fn cancel(&mut self) -> usize {
        self.abort()
    }

    /// Waits up to `timeout` for every worker to exit. Only returns early
    /// once the pool no longer accepts work.
    pub fn wait(&self, timeout: Duration) -> bool {
        self.wait_for_workers(timeout)
    }

    /// Stops accepting work and waits up to `timeout` for queued and running
    /// jobs to finish. Returns whether every worker exited in time; on
    /// timeout the remaining work keeps running in the background.
    pub fn shutdown(mut self, timeout: Duration) -> bool {
        drop(self.sender.take());
        self.wait_for_workers(timeout)
    }

    fn wait_for_workers(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut workers = self.shared.workers.lock();
        while workers.live > 0 {
            if self.shared.drained.wait_until(&mut workers, deadline).timed_out() {
                return workers.live == 0;
            }
        }
        true
    }

    fn abort(&mut self) -> usize {
        let Some(sender) = self.sender.take() else {
            return 0;
        };
        self.shared.token.cancel();
        drop(sender);

        let discarded = self.shared.receiver.try_iter().count();
        if discarded > 0 {
            debug!("Discarded {} queued job(s) on pool shutdown", discarded);
        }
        discarded
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.abort();
    }
}

fn spawn_worker(shared: &Arc<Shared>, workers: &mut Workers) {
    workers.spawned += 1;
    let name = format!("{}-{}", shared.settings.thread_name, workers.spawned);
    let worker_shared = shared.clone();

    match thread::Builder::new()
        .name(name.clone())
        .spawn(move || worker_loop(worker_shared))
    {
        Ok(_) => {
            workers.live += 1;
            workers.idle += 1;
        }
        Err(e) => error!("Failed to spawn worker thread {}: {}", name, e),
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        if shared.token.is_cancelled() {
            break;
        }

        match shared.receiver.recv_timeout(shared.settings.keep_alive) {
            Ok(job) => {
                shared.workers.lock().idle -= 1;
                if !shared.token.is_cancelled() {
                    run_job(job, &shared.token);
                }
                shared.workers.lock().idle += 1;
            }
            Err(RecvTimeoutError::Timeout) => {
                // decided under the lock so a concurrent submit either sees
                // this worker as idle or sees it gone
                let mut workers = shared.workers.lock();
                if workers.live > shared.settings.min_threads && shared.receiver.is_empty() {
                    workers.retire();
                    shared.drained.notify_all();
                    return;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    shared.workers.lock().retire();
    shared.drained.notify_all();
}

fn run_job(job: Job, token: &CancelToken) {
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| job(token))) {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        warn!("Background job panicked: {}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;

    fn settings(min: usize, max: usize, keep_alive_ms: u64) -> PoolSettings {
        PoolSettings {
            min_threads: min,
            max_threads: max,
            keep_alive: Duration::from_millis(keep_alive_ms),
            thread_name: "pool-test".to_string(),
        }
    }

    #[test]
    fn test_runs_every_job_before_draining() {
        let pool = WorkerPool::new(settings(0, 4, 1_000));
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let counter = counter.clone();
            pool.submit(Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert!(pool.shutdown(Duration::from_secs(5)));
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn test_respects_thread_bound() {
        let pool = WorkerPool::new(settings(0, 2, 1_000));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let running = running.clone();
            let peak = peak.clone();
            pool.submit(Box::new(move |_| {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(10));
                running.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        assert!(pool.live_workers() <= 2);
        assert!(pool.shutdown(Duration::from_secs(5)));
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_shutdown_now_discards_and_cancels() {
        let pool = WorkerPool::new(settings(0, 1, 1_000));
        let (started_tx, started_rx) = mpsc::channel();
        let (stopped_tx, stopped_rx) = mpsc::channel();

        pool.submit(Box::new(move |token| {
            started_tx.send(()).unwrap();
            while !token.is_cancelled() {
                thread::sleep(Duration::from_millis(1));
            }
            stopped_tx.send(()).unwrap();
        }));
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let counter = counter.clone();
            pool.submit(Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert_eq!(pool.queued(), 10);

        assert_eq!(pool.shutdown_now(), 10);
        stopped_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_wait_after_cancel_blocks_until_running_job_stops() {
        let mut pool = WorkerPool::new(settings(0, 1, 1_000));
        let (started_tx, started_rx) = mpsc::channel();
        let finished = Arc::new(AtomicBool::new(false));
        let job_finished = finished.clone();

        pool.submit(Box::new(move |token| {
            started_tx.send(()).unwrap();
            while !token.is_cancelled() {
                thread::sleep(Duration::from_millis(1));
            }
            thread::sleep(Duration::from_millis(50));
            job_finished.store(true, Ordering::SeqCst);
        }));
        pool.submit(Box::new(|_| {}));
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        assert_eq!(pool.cancel(), 1);
        assert!(pool.wait(Duration::from_secs(5)));
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(pool.live_workers(), 0);
    }

    #[test]
    fn test_wait_after_cancel_times_out_on_stuck_job() {
        let mut pool = WorkerPool::new(settings(0, 1, 1_000));
        let (started_tx, started_rx) = mpsc::channel();
        pool.submit(Box::new(move |_| {
            started_tx.send(()).unwrap();
            thread::sleep(Duration::from_millis(300));
        }));
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        pool.cancel();
        assert!(!pool.wait(Duration::from_millis(10)));
        assert!(pool.wait(Duration::from_secs(5)));
    }

    #[test]
    fn test_graceful_shutdown_times_out() {
        let pool = WorkerPool::new(settings(0, 1, 1_000));
        pool.submit(Box::new(|_| thread::sleep(Duration::from_millis(300))));
        assert!(!pool.shutdown(Duration::from_millis(10)));
    }

    #[test]
    fn test_panicking_job_keeps_worker_alive() {
        let pool = WorkerPool::new(settings(0, 1, 1_000));
        let counter = Arc::new(AtomicUsize::new(0));
        pool.submit(Box::new(|_| panic!("enumeration failed")));
        let after = counter.clone();
        pool.submit(Box::new(move |_| {
            after.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(pool.shutdown(Duration::from_secs(5)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_idle_workers_exit_after_keep_alive() {
        let pool = WorkerPool::new(settings(0, 2, 20));
        let (done_tx, done_rx) = mpsc::channel();
        pool.submit(Box::new(move |_| done_tx.send(()).unwrap()));
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while pool.live_workers() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(pool.live_workers(), 0);
    }

    #[test]
    fn test_core_workers_stay_alive() {
        let pool = WorkerPool::new(settings(1, 2, 20));
        let (done_tx, done_rx) = mpsc::channel();
        pool.submit(Box::new(move |_| done_tx.send(()).unwrap()));
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        thread::sleep(Duration::from_millis(100));
        assert_eq!(pool.live_workers(), 1);
        assert!(pool.shutdown(Duration::from_secs(5)));
    }
}
