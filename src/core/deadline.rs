// Deadline executor: races one operation against a timer.
//
// The operation runs as its own task. When the timer wins, the task handle is dropped,
// which detaches the task instead of aborting it; a well-behaved read simply finishes in
// the background and its result is discarded.

use crate::utils::error::{Result, SyncError};
use crate::utils::validation::validate_positive_duration;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinError;
use tokio::time::Instant;

/// A strictly positive time budget plus a label used in diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deadline {
    label: String,
    duration: Duration,
}

impl Deadline {
    pub fn new(label: impl Into<String>, duration: Duration) -> Result<Self> {
        let label = label.into();
        validate_positive_duration(&label, duration)?;
        Ok(Self { label, duration })
    }

    pub fn from_millis(label: impl Into<String>, millis: u64) -> Result<Self> {
        Self::new(label, Duration::from_millis(millis))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Same budget under a different label.
    pub fn relabel(&self, label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            duration: self.duration,
        }
    }
}

impl fmt::Display for Deadline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}ms)", self.label, self.duration.as_millis())
    }
}

/// Runs `op` under `deadline`.
///
/// The operation's own result is returned unchanged when it finishes in time. A timer
/// expiry yields [`SyncError::Timeout`] carrying the deadline label and the elapsed time,
/// and a panicking operation yields [`SyncError::OperationFailed`].
pub async fn run_with_deadline<T, F>(op: F, deadline: &Deadline) -> Result<T>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let started = Instant::now();
    let handle = tokio::spawn(op);

    match tokio::time::timeout(deadline.duration(), handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(SyncError::OperationFailed {
            label: deadline.label().to_string(),
            message: describe_join_error(join_error),
        }),
        Err(_) => {
            let elapsed = started.elapsed();
            tracing::debug!(
                label = deadline.label(),
                elapsed_ms = elapsed.as_millis() as u64,
                "⏱️ Deadline elapsed, abandoning operation"
            );
            Err(SyncError::timeout(deadline.label(), elapsed))
        }
    }
}

pub(crate) fn describe_join_error(error: JoinError) -> String {
    if error.is_cancelled() {
        return "task was cancelled".to_string();
    }
    match error.try_into_panic() {
        Ok(payload) => {
            if let Some(message) = payload.downcast_ref::<&str>() {
                format!("panicked: {}", message)
            } else if let Some(message) = payload.downcast_ref::<String>() {
                format!("panicked: {}", message)
            } else {
                "panicked".to_string()
            }
        }
        Err(other) => other.to_string(),
    }
}
