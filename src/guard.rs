//! Per-variant single-flight.
//!
//! Rendering a variant is slow, and popular variants are requested by many
//! callers at once. [`VariantGuard::get_or_compute`] makes sure each
//! [`VariantKey`] is computed by at most one caller at a time:
//!
//! ```text
//! ABSENT ──first caller──▶ IN_FLIGHT ──ok──▶ MATERIALIZED (in the artifact store)
//!                              │
//!                              └──error──▶ ABSENT (nothing cached)
//! ```
//!
//! - A variant already in the artifact store is returned without touching
//!   any lock shared with other keys.
//! - Otherwise the first caller becomes the owner and runs the pipeline.
//!   Later callers for the same key join its [`InFlight`] slot and block
//!   until the owner publishes.
//! - Success is shared: every waiter gets a clone of the same [`Artifact`].
//! - Failure is shared too: the owner gets its own error back and every
//!   waiter gets [`RenderError::Propagated`] pointing at one shared cause.
//! - The table entry is removed once the outcome is published, so the table
//!   only holds keys that are being computed right now and a failed key is
//!   retried by the next request.
//!
//! The table lock is held only to insert or remove an entry, never while
//! a pipeline runs.

use crate::service::RenderError;
use crate::store::ArtifactStore;
use crate::types::{Artifact, VariantKey};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

type Outcome = Result<Artifact, Arc<RenderError>>;

/// Single-assignment completion slot for one in-flight key.
#[derive(Debug, Default)]
struct InFlight {
    outcome: Mutex<Option<Outcome>>,
    done: Condvar,
}

impl InFlight {
    fn publish(&self, outcome: Outcome) {
        let mut slot = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(outcome);
        self.done.notify_all();
    }

    /// Block until published. `None` when `timeout` elapses first.
    fn wait(&self, timeout: Option<Duration>) -> Option<Outcome> {
        let slot = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = match timeout {
            None => self
                .done
                .wait_while(slot, |outcome| outcome.is_none())
                .unwrap_or_else(PoisonError::into_inner),
            Some(timeout) => {
                self.done
                    .wait_timeout_while(slot, timeout, |outcome| outcome.is_none())
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
        };
        slot.clone()
    }
}

/// Deduplicates concurrent computations of the same variant.
#[derive(Debug, Default)]
pub struct VariantGuard {
    in_flight: Mutex<HashMap<VariantKey, Arc<InFlight>>>,
    wait_timeout: Option<Duration>,
}

impl VariantGuard {
    /// Waiters block until the owner finishes, however long it takes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Waiters give up with [`RenderError::WaitTimedOut`] after `timeout`.
    /// The owner's computation is not interrupted.
    pub fn with_wait_timeout(timeout: Duration) -> Self {
        Self {
            wait_timeout: Some(timeout),
            ..Self::default()
        }
    }

    /// Number of keys currently being computed.
    pub fn in_flight(&self) -> usize {
        self.table().len()
    }

    pub fn is_in_flight(&self, key: &VariantKey) -> bool {
        self.table().contains_key(key)
    }

    /// Return the stored artifact for `key`, or compute it with `pipeline`.
    ///
    /// `pipeline` runs at most once per in-flight attempt and is expected to
    /// persist its artifact in `store`. A panic inside `pipeline` fails the
    /// waiters with [`RenderError::Aborted`] and resumes on the owner's
    /// thread.
    pub fn get_or_compute<F>(
        &self,
        key: &VariantKey,
        store: &dyn ArtifactStore,
        pipeline: F,
    ) -> Result<Artifact, RenderError>
    where
        F: FnOnce() -> Result<Artifact, RenderError>,
    {
        if let Some(artifact) = stored(store, key) {
            tracing::debug!(key = %key, "variant already materialized");
            return Ok(artifact);
        }

        let (slot, owner) = self.join(key);
        if !owner {
            tracing::debug!(key = %key, "waiting for in-flight variant");
            return match slot.wait(self.wait_timeout) {
                Some(Ok(artifact)) => Ok(artifact),
                Some(Err(cause)) => Err(RenderError::Propagated {
                    key: key.clone(),
                    cause,
                }),
                None => Err(RenderError::WaitTimedOut { key: key.clone() }),
            };
        }

        // a previous owner may have finished between the fast path and join
        if let Some(artifact) = stored(store, key) {
            self.finish(key, &slot, Ok(artifact.clone()));
            return Ok(artifact);
        }

        tracing::debug!(key = %key, "computing variant");
        match panic::catch_unwind(AssertUnwindSafe(pipeline)) {
            Ok(Ok(artifact)) => {
                self.finish(key, &slot, Ok(artifact.clone()));
                Ok(artifact)
            }
            Ok(Err(error)) => {
                tracing::warn!(key = %key, error = %error, "variant computation failed");
                self.finish(key, &slot, Err(Arc::new(error.clone())));
                Err(error)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(key = %key, message = %message, "variant computation panicked");
                let aborted = RenderError::Aborted {
                    key: key.clone(),
                    message,
                };
                self.finish(key, &slot, Err(Arc::new(aborted)));
                panic::resume_unwind(payload)
            }
        }
    }

    /// Insert-if-absent. Returns the slot and whether the caller owns it.
    fn join(&self, key: &VariantKey) -> (Arc<InFlight>, bool) {
        let mut table = self.table();
        if let Some(existing) = table.get(key) {
            return (Arc::clone(existing), false);
        }
        let slot = Arc::new(InFlight::default());
        table.insert(key.clone(), Arc::clone(&slot));
        (slot, true)
    }

    /// Publish the outcome, then drop the table entry.
    fn finish(&self, key: &VariantKey, slot: &Arc<InFlight>, outcome: Outcome) {
        slot.publish(outcome);
        let mut table = self.table();
        if table.get(key).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            table.remove(key);
        }
    }

    fn table(&self) -> std::sync::MutexGuard<'_, HashMap<VariantKey, Arc<InFlight>>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn stored(store: &dyn ArtifactStore, key: &VariantKey) -> Option<Artifact> {
    match store.exists(key) {
        Ok(true) => {}
        Ok(false) => return None,
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "artifact store lookup failed");
            return None;
        }
    }
    match store.read(key) {
        Ok(bytes) => Some(Artifact {
            key: key.clone(),
            bytes,
        }),
        Err(e) => {
            tracing::debug!(key = %key, error = %e, "stored artifact vanished before read");
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "pipeline panicked".to_string()
    }
}
