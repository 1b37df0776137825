// Low-power observer
// Watches the core through its read-only view and flags the vehicle idle once it has
// been disconnected and quiet for the idle timeout. The sleep/wake cycle itself lives
// outside this crate; the flag is what it would consume.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::info;

use crate::vehicle::ActivityView;

pub struct IdleMonitor {
    view: ActivityView,
    timeout: Duration,
    idle: Arc<AtomicBool>,
}

impl IdleMonitor {
    pub fn new(view: ActivityView, timeout: Duration) -> Self {
        Self {
            view,
            timeout,
            idle: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared flag other tasks can read
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.idle)
    }

    pub fn is_idle(&self) -> bool {
        self.idle.load(Ordering::Relaxed)
    }

    /// Re-evaluate at `now`. Returns the new state when it changed.
    pub fn poll(&self, now: Instant) -> Option<bool> {
        let quiet_for = now.saturating_duration_since(self.view.last_activity());
        let idle = !self.view.is_connected() && quiet_for >= self.timeout;

        let was = self.idle.swap(idle, Ordering::Relaxed);
        if was == idle {
            return None;
        }
        if idle {
            info!("Idle after {} ms without activity", quiet_for.as_millis());
        } else {
            info!("Activity resumed, leaving idle");
        }
        Some(idle)
    }
}
