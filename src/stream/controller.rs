//! Pause/resume/abort handle for a streaming run.

use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, Default)]
struct Gate {
    paused: bool,
    aborted: bool,
}

/// Cooperative control over a run. Clones share state, so a caller can keep one
/// clone and hand another to the pipeline.
///
/// The run observes the controller only at checkpoints: it first waits while
/// paused, then checks for abort. Aborting also releases a paused run so the abort
/// is seen without a resume.
#[derive(Debug, Clone)]
pub struct StreamController {
    gate: Arc<watch::Sender<Gate>>,
}

impl Default for StreamController {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamController {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(Gate::default());
        Self {
            gate: Arc::new(gate),
        }
    }

    /// Abort the run. Permanent; repeated calls have no further effect.
    pub fn abort(&self) {
        self.gate.send_if_modified(|gate| {
            let changed = !gate.aborted;
            gate.aborted = true;
            changed
        });
    }

    pub fn is_aborted(&self) -> bool {
        self.gate.borrow().aborted
    }

    /// Hold the run at its next checkpoint. No-op if already paused.
    pub fn pause(&self) {
        self.gate.send_if_modified(|gate| {
            let changed = !gate.paused;
            gate.paused = true;
            changed
        });
    }

    /// Release a paused run.
    pub fn resume(&self) {
        self.gate.send_if_modified(|gate| {
            let changed = gate.paused;
            gate.paused = false;
            changed
        });
    }

    pub fn is_paused(&self) -> bool {
        self.gate.borrow().paused
    }

    /// Wait until the controller is resumed or aborted. Returns at once if not
    /// paused.
    pub async fn wait_if_paused(&self) {
        let mut rx = self.gate.subscribe();
        // Err only when the sender is dropped, and `self` owns it.
        let _ = rx.wait_for(|gate| !gate.paused || gate.aborted).await;
    }
}
