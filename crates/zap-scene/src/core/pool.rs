// core/pool.rs
//
// Worker pool for layer stepping. Each layer step is one task; the frame
// thread submits a batch and blocks on the batch barrier. Tasks never run
// listeners, they only step a world and enqueue collision dispatches.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::api::error::{Result, SceneError};
use crate::api::types::LayerId;

/// How often a waiting frame thread re-checks its cancel token.
const BARRIER_POLL: Duration = Duration::from_millis(2);

/// One layer step, ready to run on a worker.
pub type StepTask = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

/// Cooperative cancellation flag shared between the host and the frame loop.
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

/// Count of submitted-but-unfinished tasks, with a condvar for teardown.
#[derive(Default)]
struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    fn lock(&self) -> MutexGuard<'_, usize> {
        self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self) {
        *self.lock() += 1;
    }

    fn leave(&self) {
        let mut count = self.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }
}

/// Decrements the in-flight count even if the task unwinds.
struct LeaveGuard(Arc<InFlight>);

impl Drop for LeaveGuard {
    fn drop(&mut self) {
        self.0.leave();
    }
}

/// Rayon thread pool dedicated to layer stepping.
pub struct StepPool {
    pool: Mutex<Option<rayon::ThreadPool>>,
    in_flight: Arc<InFlight>,
}

impl StepPool {
    /// Build a pool with `threads` workers (0 = rayon default).
    pub fn new(threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("zap-step-{i}"))
            .build()
            .map_err(|e| SceneError::WorkerPool(e.to_string()))?;
        log::info!("step pool started with {} worker(s)", pool.current_num_threads());
        Ok(Self {
            pool: Mutex::new(Some(pool)),
            in_flight: Arc::new(InFlight::default()),
        })
    }

    /// Number of tasks submitted and not yet finished.
    pub fn in_flight(&self) -> usize {
        *self.in_flight.lock()
    }

    pub fn is_shut_down(&self) -> bool {
        self.pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Submit one task per layer. Results come back through the batch.
    pub fn submit(&self, tasks: Vec<(LayerId, StepTask)>) -> Result<StepBatch> {
        let guard = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
        let pool = guard.as_ref().ok_or(SceneError::PoolShutDown)?;
        let (tx, rx) = mpsc::channel();
        let expected = tasks.len();

        for (layer, task) in tasks {
            let tx = tx.clone();
            self.in_flight.enter();
            let leave = LeaveGuard(Arc::clone(&self.in_flight));
            pool.spawn(move || {
                let _leave = leave;
                let outcome = match panic::catch_unwind(AssertUnwindSafe(task)) {
                    Ok(result) => result,
                    Err(payload) => Err(SceneError::StepFailed {
                        layer,
                        message: panic_message(payload.as_ref()),
                    }),
                };
                // The frame thread may have stopped listening after a cancel.
                let _ = tx.send((layer, outcome));
            });
        }

        Ok(StepBatch {
            results: rx,
            remaining: expected,
        })
    }

    /// Wait up to `grace` for in-flight tasks, then drop the pool.
    ///
    /// Returns `true` when every task finished in time. Tasks still running
    /// afterwards are abandoned; rayon lets them finish on their own threads.
    pub fn shutdown(&self, grace: Duration) -> bool {
        let deadline = Instant::now() + grace;
        let mut count = self.in_flight.lock();
        while *count > 0 {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            count = self
                .in_flight
                .idle
                .wait_timeout(count, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        let abandoned = *count;
        drop(count);

        self.pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if abandoned > 0 {
            log::warn!(
                "step pool shut down with {abandoned} task(s) still running after {:?}; abandoning them",
                grace
            );
            false
        } else {
            log::info!("step pool shut down cleanly");
            true
        }
    }
}

/// Outcome of waiting on a [`StepBatch`].
#[derive(Debug)]
pub enum BatchStatus {
    /// Every task reported back. Holds the first failure, if any.
    Completed(Result<()>),
    /// The cancel token fired before the barrier was reached.
    Cancelled,
}

/// Join-barrier over one frame's submitted step tasks.
pub struct StepBatch {
    results: Receiver<(LayerId, Result<()>)>,
    remaining: usize,
}

impl StepBatch {
    /// Number of tasks that have not reported back yet.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Block until every task has reported back.
    pub fn join(mut self) -> Result<()> {
        // Without a token the barrier cannot be cancelled.
        self.collect(None).unwrap_or(Ok(()))
    }

    /// Block until every task has reported back or `cancel` fires.
    pub fn wait(&mut self, cancel: &CancelToken) -> BatchStatus {
        match self.collect(Some(cancel)) {
            Some(result) => BatchStatus::Completed(result),
            None => BatchStatus::Cancelled,
        }
    }

    fn collect(&mut self, cancel: Option<&CancelToken>) -> Option<Result<()>> {
        let mut first_error = None;
        while self.remaining > 0 {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                return None;
            }
            match self.results.recv_timeout(BARRIER_POLL) {
                Ok((layer, result)) => {
                    self.remaining -= 1;
                    if let Err(err) = result {
                        log::error!("layer {layer:?} step failed: {err}");
                        first_error.get_or_insert(err);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    // Senders are dropped only after sending, so this means
                    // the pool was torn down underneath the batch.
                    self.remaining = 0;
                    first_error.get_or_insert(SceneError::PoolShutDown);
                }
            }
        }
        Some(first_error.map_or(Ok(()), Err))
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "step task panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[test]
    fn join_waits_for_every_task() {
        let pool = StepPool::new(2).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let tasks: Vec<(LayerId, StepTask)> = (0..4)
            .map(|_| {
                let counter = Arc::clone(&counter);
                let task: StepTask = Box::new(move || {
                    thread::sleep(Duration::from_millis(5));
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
                (LayerId::next(), task)
            })
            .collect();

        pool.submit(tasks).unwrap().join().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 4);
        assert_eq!(pool.in_flight(), 0);
    }

    #[test]
    fn panicking_task_becomes_step_failed() {
        let pool = StepPool::new(1).unwrap();
        let layer = LayerId::next();
        let task: StepTask = Box::new(|| panic!("solver exploded"));
        let err = pool.submit(vec![(layer, task)]).unwrap().join().unwrap_err();
        match err {
            SceneError::StepFailed { layer: failed, message } => {
                assert_eq!(failed, layer);
                assert!(message.contains("solver exploded"));
            }
            other => panic!("expected StepFailed, got {other:?}"),
        }
    }

    #[test]
    fn cancel_interrupts_the_barrier_and_shutdown_is_bounded() {
        let pool = StepPool::new(1).unwrap();
        let cancel = CancelToken::new();
        let task: StepTask = Box::new(|| {
            thread::sleep(Duration::from_secs(3));
            Ok(())
        });
        let mut batch = pool.submit(vec![(LayerId::next(), task)]).unwrap();

        let started = Instant::now();
        cancel.cancel();
        assert!(matches!(batch.wait(&cancel), BatchStatus::Cancelled));
        assert!(!pool.shutdown(Duration::from_millis(50)));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(pool.is_shut_down());
    }

    #[test]
    fn submit_after_shutdown_fails() {
        let pool = StepPool::new(1).unwrap();
        assert!(pool.shutdown(Duration::from_millis(10)));
        let task: StepTask = Box::new(|| Ok(()));
        assert!(matches!(
            pool.submit(vec![(LayerId::next(), task)]),
            Err(SceneError::PoolShutDown)
        ));
    }

    #[test]
    fn empty_batch_completes_immediately() {
        let pool = StepPool::new(1).unwrap();
        let mut batch = pool.submit(Vec::new()).unwrap();
        assert!(matches!(
            batch.wait(&CancelToken::new()),
            BatchStatus::Completed(Ok(()))
        ));
    }
}
