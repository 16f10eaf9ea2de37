//! Background decay job for a [`ContextWindow`](super::ContextWindow).
//!
//! The job holds only a weak reference to the window state, so it never keeps a
//! dropped window alive. Stopping sets a flag that the job checks while holding the
//! state lock; once [`DecayTask::stop`] returns under that lock, no further cycle can
//! run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::ContextState;

pub(crate) struct DecayTask {
    handle: JoinHandle<()>,
    stopped: Arc<AtomicBool>,
}

impl DecayTask {
    /// Spawn the job on the current tokio runtime. Returns `None` when called
    /// outside a runtime.
    pub(crate) fn spawn(state: Weak<Mutex<ContextState>>, period: Duration) -> Option<Self> {
        let runtime = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("no tokio runtime available, context decay will only run manually");
                return None;
            }
        };

        let stopped = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stopped);
        let period = period.max(Duration::from_millis(1));

        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !run_cycle(&state, &flag) {
                    break;
                }
            }
            debug!("context decay task exited");
        });

        debug!(period_ms = period.as_millis() as u64, "context decay task started");
        Some(Self { handle, stopped })
    }

    /// Stop the job. Callers hold the state lock so a cycle cannot be mid-flight.
    pub(crate) fn stop(self) {
        self.stopped.store(true, Ordering::Release);
        self.handle.abort();
    }
}

/// One decay cycle. Returns `false` when the job should exit.
fn run_cycle(state: &Weak<Mutex<ContextState>>, stopped: &AtomicBool) -> bool {
    let Some(state) = state.upgrade() else {
        return false;
    };
    let mut guard = crate::lock(&state);
    if stopped.load(Ordering::Acquire) {
        return false;
    }
    let removed = guard.apply_decay();
    debug!(removed, remaining = guard.len(), "background context decay");
    true
}
