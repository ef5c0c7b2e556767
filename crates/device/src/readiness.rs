//! Readiness gate for the board's radio module.
//!
//! Tracks whether the radio is powered up and lets callers wait for it to
//! come up. The ready flag and the waiter list share one lock, so a caller
//! either sees the flag already set or is registered before the next
//! transition can release waiters. There is no window in which a ready
//! transition can slip between the check and the registration.

use std::time::Duration;

use parking_lot::Mutex;
use sb_protocol::PowerState;
use tokio::sync::oneshot;

#[derive(Default)]
struct GateState {
    ready: bool,
    waiters: Vec<oneshot::Sender<()>>,
}

#[derive(Default)]
pub struct ReadinessGate {
    state: Mutex<GateState>,
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.state.lock().ready
    }

    /// Wait until the radio is ready or `timeout` elapses.
    ///
    /// Returns `true` immediately when already ready, whatever `timeout` is.
    pub async fn wait_ready(&self, timeout: Duration) -> bool {
        let rx = {
            let mut state = self.state.lock();
            if state.ready {
                return true;
            }
            // Drop slots abandoned by earlier timed-out callers.
            state.waiters.retain(|w| !w.is_closed());
            let (tx, rx) = oneshot::channel();
            state.waiters.push(tx);
            rx
        };

        matches!(tokio::time::timeout(timeout, rx).await, Ok(Ok(())))
    }

    /// Apply a power state observed on the wire.
    ///
    /// Returns `true` when this call moved the gate to ready.
    pub fn update(&self, power: PowerState) -> bool {
        let mut state = self.state.lock();
        match power {
            PowerState::Connected if !state.ready => {
                state.ready = true;
                let waiters = std::mem::take(&mut state.waiters);
                let released = waiters.len();
                for waiter in waiters {
                    // A waiter that already timed out has dropped its receiver.
                    let _ = waiter.send(());
                }
                tracing::debug!(released, "radio module ready");
                true
            }
            PowerState::Connected => false,
            PowerState::Disconnected => {
                if state.ready {
                    tracing::debug!("radio module no longer ready");
                }
                state.ready = false;
                false
            }
        }
    }

    /// Forget readiness, e.g. after the link to the board was lost.
    pub fn clear(&self) {
        self.update(PowerState::Disconnected);
    }

    #[cfg(test)]
    fn pending_waiters(&self) -> usize {
        self.state.lock().waiters.len()
    }
}
