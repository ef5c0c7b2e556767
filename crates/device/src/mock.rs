//! Hardware-free stand-in for [`DeviceSession`](crate::DeviceSession).

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::connection::{ConnectionKind, SmsConnection};
use crate::error::SessionError;

/// Always connected, always ready. `send` only waits and records.
#[derive(Debug)]
pub struct MockSession {
    send_delay: Duration,
    sent: Mutex<Vec<(String, String)>>,
    closed: AtomicBool,
}

impl MockSession {
    pub fn new(send_delay: Duration) -> Self {
        Self {
            send_delay,
            sent: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// `(number, content)` pairs passed to `send`, oldest first.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }
}

impl Default for MockSession {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

#[async_trait]
impl SmsConnection for MockSession {
    async fn send(&self, number: &str, content: &str) -> Result<(), SessionError> {
        tracing::info!(number = %number, chars = content.chars().count(), "mock: sending SMS");
        tokio::time::sleep(self.send_delay).await;
        self.sent.lock().push((number.to_string(), content.to_string()));
        Ok(())
    }

    async fn wakeup(&self) -> Result<(), SessionError> {
        Ok(())
    }

    async fn ensure_ready(&self, _timeout: Duration) -> Result<(), SessionError> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn is_ready(&self) -> bool {
        true
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::info!("mock session closed");
        }
    }

    fn kind(&self) -> ConnectionKind {
        ConnectionKind::Mock
    }

    fn endpoint(&self) -> Option<String> {
        None
    }
}
