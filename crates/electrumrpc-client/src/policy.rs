//! Reconnect persistence policy.
//!
//! Decides what happens after an unexpected close: reconnect while retries
//! remain, then run the exhaustion callback once.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

type Callback = Arc<dyn Fn() + Send + Sync>;

/// Bounded reconnect policy.
///
/// Clones share one retry counter, so a clone kept by the caller observes
/// the retries the client consumed.
#[derive(Clone)]
pub struct PersistencePolicy {
    remaining: Arc<AtomicU32>,
    on_exhausted: Option<Callback>,
}

impl PersistencePolicy {
    /// Allow `max_retry` reconnects.
    pub fn new(max_retry: u32) -> Self {
        Self {
            remaining: Arc::new(AtomicU32::new(max_retry)),
            on_exhausted: None,
        }
    }

    /// Run `f` once the retries are spent and the connection closes again.
    pub fn on_exhausted<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_exhausted = Some(Arc::new(f));
        self
    }

    pub fn remaining_retries(&self) -> u32 {
        self.remaining.load(Ordering::SeqCst)
    }

    /// Consume one retry. Returns `false` (and leaves the counter at zero)
    /// when none are left.
    pub(crate) fn try_consume(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Run the exhaustion callback, if any. Returns whether one ran.
    pub(crate) fn exhaust(&self) -> bool {
        match &self.on_exhausted {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for PersistencePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistencePolicy")
            .field("remaining", &self.remaining_retries())
            .field("on_exhausted", &self.on_exhausted.is_some())
            .finish()
    }
}
