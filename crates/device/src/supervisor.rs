//! Reconnection supervisor: reopens the link after it was lost.
//!
//! Single-flight: [`trigger`] starts a run only when none is active, so
//! repeated loss reports collapse into one retry loop. A run keeps trying
//! at a fixed interval until it installs a new transport or the session
//! shuts down.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::DiscoveryError;
use crate::session::{Phase, Shared};
use crate::transport::Transport;

#[derive(Debug, Default)]
pub(crate) struct SupervisorState {
    active: AtomicBool,
    runs: AtomicU64,
}

impl SupervisorState {
    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Number of runs started over the session's lifetime.
    #[cfg(test)]
    pub(crate) fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }
}

/// Clears the active flag when the run ends, however it ends.
struct ActiveGuard<'a>(&'a AtomicBool);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Start a reconnection run unless one is already active.
///
/// Returns `true` if this call started the run.
pub(crate) fn trigger(shared: &Arc<Shared>) -> bool {
    if shared
        .supervisor
        .active
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return false;
    }
    shared.supervisor.runs.fetch_add(1, Ordering::Relaxed);

    let shared = Arc::clone(shared);
    tokio::spawn(async move {
        let _active = ActiveGuard(&shared.supervisor.active);
        run(&shared).await;
    });
    true
}

async fn run(shared: &Arc<Shared>) {
    let retry_interval = shared.options.retry_interval;
    let mut attempt: u32 = 0;

    loop {
        if shared.cancel.is_cancelled() {
            return;
        }
        attempt += 1;

        let reopened = tokio::select! {
            r = reopen(shared) => r,
            _ = shared.cancel.cancelled() => return,
        };

        match reopened {
            Ok(transport) => {
                let endpoint = transport.endpoint().to_string();
                if install(shared, transport).await {
                    tracing::info!(endpoint = %endpoint, attempt, "reconnected to device");
                }
                return;
            }
            Err(e) => {
                tracing::warn!(
                    attempt,
                    error = %e,
                    retry_in_ms = retry_interval.as_millis() as u64,
                    "reconnect attempt failed"
                );
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(retry_interval) => {}
            _ = shared.cancel.cancelled() => return,
        }
    }
}

/// Pick the target endpoint and open it.
async fn reopen(shared: &Shared) -> Result<Arc<dyn Transport>, DiscoveryError> {
    let endpoint = if shared.options.auto_discover {
        shared
            .options
            .discovery
            .discover(shared.connector.as_ref())
            .await?
    } else {
        last_endpoint(shared)
    };

    tracing::info!(endpoint = %endpoint, "reopening device link");
    Ok(shared
        .connector
        .open(&endpoint, shared.options.warm_up)
        .await?)
}

fn last_endpoint(shared: &Shared) -> String {
    shared.link.lock().endpoint.clone()
}

/// Swap `transport` in, closing the stale one first.
///
/// Returns `false` (and closes `transport`) if the session shut down in the
/// meantime.
async fn install(shared: &Shared, transport: Arc<dyn Transport>) -> bool {
    let _guard = shared.write_gate.lock().await;

    let stale = shared.link.lock().transport.take();
    if let Some(stale) = stale {
        stale.close().await;
    }

    let installed = {
        let mut link = shared.link.lock();
        if shared.cancel.is_cancelled() {
            false
        } else {
            link.endpoint = transport.endpoint().to_string();
            link.transport = Some(transport.clone());
            link.phase = Phase::Connected;
            true
        }
    };

    if !installed {
        transport.close().await;
    }
    installed
}
