//! Runs the independent rollouts of a scenario on a pool of scoped worker threads and
//! merges them into a `Summary`.
//!
//! Workers pull rollout indices from a shared counter, so no rollout is run twice and the
//! assignment of rollouts to threads has no effect on the results: rollout `k` is always
//! seeded `base_seed + k`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::error::SimError;
use crate::params::SimulationSetup;
use crate::rollout::{Rollout, RolloutRecord};
use crate::summary::Summary;

struct TokenInner {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
    parent: Option<CancellationToken>,
}

/// A cooperative stop signal shared between the caller and the workers.
///
/// A token is cancelled when `cancel` is called on it, when its deadline passes or when its
/// parent is cancelled. Cancelling a child leaves the parent untouched.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        CancellationToken::new()
    }
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> CancellationToken {
        CancellationToken::build(None, None)
    }

    #[must_use]
    pub fn with_deadline(deadline: Instant) -> CancellationToken {
        CancellationToken::build(Some(deadline), None)
    }

    #[must_use]
    pub fn with_timeout(timeout: Duration) -> CancellationToken {
        CancellationToken::with_deadline(Instant::now() + timeout)
    }

    /// A token that is cancelled with `self` but can also be cancelled on its own.
    #[must_use]
    pub fn child(&self) -> CancellationToken {
        CancellationToken::build(None, Some(self.clone()))
    }

    fn build(deadline: Option<Instant>, parent: Option<CancellationToken>) -> CancellationToken {
        CancellationToken {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                deadline,
                parent,
            }),
        }
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Relaxed)
            || self.inner.deadline.is_some_and(|deadline| Instant::now() >= deadline)
            || self.inner.parent.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}

/// Runs `setup.params.random_repeats` rollouts on at most `cpu_count` threads and merges
/// them.
///
/// # Errors
///
/// * `SimError::InsufficientRolloutsError` if fewer than two rollouts are requested.
/// * `SimError::RolloutError` with the first failure; the other workers are stopped.
/// * `SimError::Cancelled` if `cancel` fires first. Finished rollouts are discarded.
pub fn launch_parallel_rollouts(
    setup: &SimulationSetup,
    cancel: &CancellationToken,
) -> Result<Summary, SimError> {
    let repeats = setup.params.random_repeats;
    if repeats < 2 {
        return Err(SimError::InsufficientRolloutsError { completed: 0 });
    }
    let num_workers = setup.params.cpu_count.clamp(1, repeats);
    info!("launching {repeats} rollouts on {num_workers} threads");
    let started = Instant::now();

    let stop = cancel.child();
    let next_rollout = AtomicUsize::new(0);
    let records: Mutex<Vec<RolloutRecord>> = Mutex::new(Vec::with_capacity(repeats));
    let failure: Mutex<Option<SimError>> = Mutex::new(None);

    thread::scope(|scope| {
        for worker in 0..num_workers {
            let stop = &stop;
            let next_rollout = &next_rollout;
            let records = &records;
            let failure = &failure;
            scope.spawn(move || loop {
                if stop.is_cancelled() {
                    break;
                }
                let rollout = next_rollout.fetch_add(1, Ordering::Relaxed);
                if rollout >= repeats {
                    break;
                }
                debug!("worker {worker} takes rollout {rollout}");
                match Rollout::new(setup, rollout).run(stop) {
                    Ok(record) => records
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(record),
                    Err(SimError::Cancelled) => break,
                    Err(err) => {
                        let mut failure = failure.lock().unwrap_or_else(PoisonError::into_inner);
                        if failure.is_none() {
                            *failure = Some(SimError::RolloutError {
                                rollout,
                                source: Box::new(err),
                            });
                        }
                        stop.cancel();
                        break;
                    }
                }
            });
        }
    });

    if let Some(err) = failure.into_inner().unwrap_or_else(PoisonError::into_inner) {
        return Err(err);
    }
    if cancel.is_cancelled() {
        info!("cancelled after {}", humantime::format_duration(started.elapsed()));
        return Err(SimError::Cancelled);
    }
    let records = records.into_inner().unwrap_or_else(PoisonError::into_inner);
    if records.len() < 2 {
        return Err(SimError::InsufficientRolloutsError {
            completed: records.len(),
        });
    }
    // Whole seconds keep the log line short.
    let elapsed = Duration::from_secs(started.elapsed().as_secs());
    info!(
        "{} rollouts finished in {}",
        records.len(),
        humantime::format_duration(elapsed)
    );
    Summary::from_records(setup, records)
}
