//! Process-wide transport state shared by every open server and client.
//!
//! The first [`TransportContext::acquire`] sets up the shared clock; the
//! context is torn down when the last guard is dropped. Acquiring again later
//! starts a fresh context.

use log::debug;
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

static ACTIVE: Mutex<Weak<ContextInner>> = Mutex::new(Weak::new());

#[derive(Debug)]
struct ContextInner {
    epoch: Instant,
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        debug!("Transport context shut down");
    }
}

/// Counted guard over the shared transport state.
#[derive(Debug, Clone)]
pub struct TransportContext {
    inner: Arc<ContextInner>,
}

impl TransportContext {
    /// Joins the live context or starts a new one.
    pub fn acquire() -> Self {
        let mut active = ACTIVE.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(inner) = active.upgrade() {
            return Self { inner };
        }

        let inner = Arc::new(ContextInner {
            epoch: Instant::now(),
        });
        *active = Arc::downgrade(&inner);
        debug!("Transport context initialized");
        Self { inner }
    }

    /// Milliseconds since the context was initialized, wrapping at `u32::MAX`.
    pub fn now_ms(&self) -> u32 {
        self.inner.epoch.elapsed().as_millis() as u32
    }

    /// Number of live guards sharing this context.
    #[cfg(test)]
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    #[cfg(test)]
    pub fn shares_state_with(&self, other: &TransportContext) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
