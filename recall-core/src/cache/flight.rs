//! Single-Flight Computations
//!
//! A flight is one running execution of a cached method on one instance.
//! Every caller that arrives while it runs awaits the same flight and gets
//! the same result.
//!
//! # Lifecycle
//!
//! 1. The first caller prepares the computation and stores a shared handle
//!    to it in the instance's in-flight slot while holding the instance lock.
//! 2. Once the lock is released, that caller spawns the computation task and
//!    hands its join handle to the shared flight.
//! 3. Later callers clone the flight handle and await it.
//! 4. When the computation finishes, the task itself does the bookkeeping
//!    (store the value or leave the cache alone, release the slot) before any
//!    caller observes the result.
//!
//! Running the computation in its own task means it completes even if every
//! caller stops waiting. If the task dies anyway (panic, runtime shutdown),
//! the guard it owns releases the slot so the next call starts over.

use std::any::Any;
use std::sync::Arc;

use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::cached::ComputeFn;
use super::frame::CallStack;
use super::state::Cacheable;
use crate::error::{CacheError, CacheResult};

/// A cached value with its type erased.
pub(crate) type ErasedValue = Arc<dyn Any + Send + Sync>;

/// What every caller joined to a flight receives.
pub(crate) type FlightResult = Result<ErasedValue, CacheError>;

/// Shared handle to a running computation.
pub(crate) type Flight = Shared<BoxFuture<'static, FlightResult>>;

/// Releases the in-flight slot if the task ends without reaching its own
/// bookkeeping.
struct FlightGuard<H: Cacheable> {
    host: Arc<H>,
    method: Arc<str>,
    armed: bool,
}

impl<H: Cacheable> Drop for FlightGuard<H> {
    fn drop(&mut self) {
        if self.armed {
            warn!(method = %self.method, "computation ended without completing");
            self.host.cache_state().lock().release(&self.method);
        }
    }
}

/// A computation whose flight is reserved but whose task is not spawned yet.
///
/// Spawning can drop the task on the spot (a runtime that is shutting down),
/// which runs the guard and locks the instance, so [`Takeoff::spawn`] must be
/// called after the instance lock is released.
#[must_use = "dropping a takeoff aborts the reserved flight"]
pub(crate) struct Takeoff {
    runtime: Handle,
    task: BoxFuture<'static, FlightResult>,
    handle_tx: oneshot::Sender<JoinHandle<FlightResult>>,
}

impl Takeoff {
    pub(crate) fn spawn(self) {
        let handle = self.runtime.spawn(self.task);
        // the receiver lives in the flight, which the in-flight slot holds
        let _ = self.handle_tx.send(handle);
    }
}

/// Prepare a computation of `method` on `host`.
///
/// `started_at` is the method's dirty generation when the flight began; the
/// dirty mark is only cleared on completion if it is still current. The
/// caller must store the returned flight in the in-flight slot before
/// releasing the instance lock, and spawn the task after releasing it.
pub(crate) fn launch<H: Cacheable>(
    host: Arc<H>,
    method: Arc<str>,
    started_at: u64,
    compute: Arc<ComputeFn<H>>,
    stack: CallStack,
) -> CacheResult<(Flight, Takeoff)> {
    let runtime = Handle::try_current().map_err(|_| CacheError::NoRuntime {
        method: Arc::clone(&method),
    })?;

    let instance = host.cache_state().id().raw();
    let depth = stack.depth();
    let mut guard = FlightGuard {
        host,
        method: Arc::clone(&method),
        armed: true,
    };

    let task = async move {
        debug!(method = %guard.method, instance, started_at, depth, "compute: start");

        let outcome = compute(Arc::clone(&guard.host)).await;
        let mut slots = guard.host.cache_state().lock();
        let result = match outcome {
            Ok(value) => {
                let stale = slots.commit(&guard.method, Arc::clone(&value), started_at);
                debug!(method = %guard.method, instance, stale, "compute: done");
                Ok(value)
            }
            Err(source) => {
                slots.release(&guard.method);
                warn!(method = %guard.method, instance, error = %source, "compute: failed");
                Err(CacheError::Computation {
                    method: Arc::clone(&guard.method),
                    source,
                })
            }
        };
        drop(slots);
        guard.armed = false;
        result
    };

    let (handle_tx, handle_rx) = oneshot::channel::<JoinHandle<FlightResult>>();

    let flight = async move {
        let handle = handle_rx.await.map_err(|_| CacheError::Aborted {
            method: Arc::clone(&method),
        })?;
        match handle.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => Err(CacheError::Panicked { method }),
            Err(_) => Err(CacheError::Aborted { method }),
        }
    }
    .boxed()
    .shared();

    let takeoff = Takeoff {
        runtime,
        task: stack.scope(task).boxed(),
        handle_tx,
    };

    Ok((flight, takeoff))
}
