//! Minimal task scheduler for partition work.
//!
//! Tasks go into a shared [`Injector`] and a fixed number of scoped worker
//! threads steal from it until it runs dry. A [`CompletionEvent`] counts
//! finished tasks and keeps the first failure.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_deque::{Injector, Steal};
use fjoin_error::{JoinError, Result};
use parking_lot::Mutex;

/// Completion tracking for one batch of tasks.
#[derive(Debug)]
pub struct CompletionEvent {
    total: usize,
    finished: AtomicUsize,
    first_error: Mutex<Option<JoinError>>,
}

impl CompletionEvent {
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self {
            total,
            finished: AtomicUsize::new(0),
            first_error: Mutex::new(None),
        }
    }

    /// Record the outcome of one task.
    pub fn finish_task(&self, outcome: Result<()>) {
        if let Err(err) = outcome {
            let mut slot = self.first_error.lock();
            if slot.is_none() {
                *slot = Some(err);
            }
        }
        self.finished.fetch_add(1, Ordering::AcqRel);
    }

    #[must_use]
    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::Acquire)
    }

    #[must_use]
    pub const fn total(&self) -> usize {
        self.total
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.finished() >= self.total
    }

    /// `Ok` when every task finished without error, else the first error seen.
    pub fn into_result(self) -> Result<()> {
        if let Some(err) = self.first_error.into_inner() {
            return Err(err);
        }
        let finished = self.finished.into_inner();
        if finished != self.total {
            return Err(JoinError::internal(format!(
                "{finished} of {} tasks finished",
                self.total
            )));
        }
        Ok(())
    }
}

/// Runs batches of independent tasks on scoped worker threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskScheduler {
    threads: usize,
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::with_available_parallelism()
    }
}

impl TaskScheduler {
    #[must_use]
    pub fn new(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
        }
    }

    #[must_use]
    pub fn with_available_parallelism() -> Self {
        Self::new(std::thread::available_parallelism().map_or(1, NonZeroUsize::get))
    }

    #[must_use]
    pub const fn threads(&self) -> usize {
        self.threads
    }

    /// Run every task to completion and report the first failure.
    ///
    /// Tasks keep running after one fails; the batch is only reported once
    /// all of them are done.
    pub fn run<F>(&self, tasks: Vec<F>) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send,
    {
        let event = CompletionEvent::new(tasks.len());
        if tasks.is_empty() {
            return event.into_result();
        }
        let workers = self.threads.min(tasks.len());
        let injector = Injector::new();
        for task in tasks {
            injector.push(task);
        }
        tracing::debug!(
            target: "fjoin.exec::scheduler",
            tasks = event.total(),
            workers,
            "running task batch"
        );
        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    loop {
                        match injector.steal() {
                            Steal::Success(task) => event.finish_task(task()),
                            Steal::Empty => break,
                            Steal::Retry => {}
                        }
                    }
                });
            }
        });
        event.into_result()
    }
}
