//! Per-axis mutual exclusion
//!
//! Only one actuation may drive an axis at a time. Acquisition first waits a
//! short bounded time; if the previous holder is still tearing down it then
//! waits without bound. The previous holder has already been asked to cancel
//! by then, so it releases promptly.

use crate::types::Axis;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Mutex serializing actuation on one axis
#[derive(Debug, Clone)]
pub struct AxisMutex {
    axis: Axis,
    lock: Arc<Mutex<()>>,
}

impl AxisMutex {
    pub fn new(axis: Axis) -> Self {
        Self {
            axis,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    /// Acquire the axis, waiting `bounded_wait` before falling back to an unbounded wait
    pub async fn acquire(&self, bounded_wait: Duration) -> AxisGuard {
        match tokio::time::timeout(bounded_wait, self.lock.clone().lock_owned()).await {
            Ok(guard) => AxisGuard {
                axis: self.axis,
                contended: false,
                _guard: guard,
            },
            Err(_) => {
                tracing::debug!(
                    "{} axis busy after {:?}, waiting for previous pulse to release",
                    self.axis,
                    bounded_wait
                );
                let guard = self.lock.clone().lock_owned().await;
                AxisGuard {
                    axis: self.axis,
                    contended: true,
                    _guard: guard,
                }
            }
        }
    }

    /// Acquire only if the axis is free right now
    pub fn try_acquire(&self) -> Option<AxisGuard> {
        self.lock.clone().try_lock_owned().ok().map(|guard| AxisGuard {
            axis: self.axis,
            contended: false,
            _guard: guard,
        })
    }

    pub fn is_locked(&self) -> bool {
        self.lock.try_lock().is_err()
    }
}

/// Holds an axis until dropped
#[derive(Debug)]
pub struct AxisGuard {
    axis: Axis,
    contended: bool,
    _guard: OwnedMutexGuard<()>,
}

impl AxisGuard {
    pub fn axis(&self) -> Axis {
        self.axis
    }

    /// True if the bounded wait expired and the unbounded wait was used
    pub fn was_contended(&self) -> bool {
        self.contended
    }
}

impl Drop for AxisGuard {
    fn drop(&mut self) {
        tracing::trace!("{} axis mutex released", self.axis);
    }
}
