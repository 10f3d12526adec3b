//! Fixed-size worker pool backing `Officer::receive_async`.
//!
//! Workers drain a shared crossbeam job queue until the sender is dropped.
//! Each submitted receive replies through its own bounded(1) channel, wrapped
//! in a [`ManifestFuture`].

use crate::config::OfficerConfig;
use crate::error::{PropagationError, Result};
use crate::results::ManifestResult;
use crossbeam_channel::{bounded, unbounded, Receiver, RecvError, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

pub(crate) struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub(crate) fn new(officer: &str, config: &OfficerConfig) -> Result<Self> {
        let (sender, receiver) = unbounded::<Job>();
        let count = config.effective_worker_threads();
        let mut workers = Vec::with_capacity(count);

        for index in 0..count {
            let receiver = receiver.clone();
            let name = format!("{}-{}-{}", config.thread_name_prefix, officer, index);
            let handle = thread::Builder::new()
                .name(name)
                .spawn(move || worker_loop(receiver))
                .map_err(|e| PropagationError::PoolUnavailable(e.to_string()))?;
            workers.push(handle);
        }

        debug!(officer, workers = count, "worker pool started");
        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    /// Queue a job. Hands the job back if the pool is shut down.
    pub(crate) fn submit(&self, job: Job) -> std::result::Result<(), Job> {
        match &self.sender {
            Some(sender) => sender.send(job).map_err(|e| e.into_inner()),
            None => Err(job),
        }
    }

    /// Stop accepting jobs, let queued ones finish, and join the workers.
    pub(crate) fn shutdown(&mut self) {
        self.sender.take();
        let current = thread::current().id();
        for handle in self.workers.drain(..) {
            // A worker closing its own officer cannot join itself.
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                warn!("officer worker panicked");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(jobs: Receiver<Job>) {
    while let Ok(job) = jobs.recv() {
        job();
    }
}

/// Pending result of an asynchronous `receive`.
pub struct ManifestFuture {
    receiver: Receiver<ManifestResult>,
}

impl ManifestFuture {
    pub(crate) fn channel() -> (Sender<ManifestResult>, Self) {
        let (sender, receiver) = bounded(1);
        (sender, Self { receiver })
    }

    /// A future that is already complete.
    pub(crate) fn ready(result: ManifestResult) -> Self {
        let (sender, future) = Self::channel();
        let _ = sender.send(result);
        future
    }

    /// Block until the result is available.
    pub fn wait(&self) -> std::result::Result<ManifestResult, RecvError> {
        self.receiver.recv()
    }

    /// Take the result if it is ready (non-blocking).
    pub fn try_get(&self) -> std::result::Result<ManifestResult, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block up to `timeout` for the result.
    pub fn wait_timeout(&self, timeout: Duration) -> std::result::Result<ManifestResult, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}
