use crate::core::deadline::{run_with_deadline, Deadline};
use crate::utils::error::Result;
use std::future::Future;

/// Runs `op` under `deadline` and returns `fallback` on any failure.
///
/// Errors, timeouts and panics inside the operation are logged with `label` and never
/// reach the caller.
pub async fn run_safe<T, F>(op: F, fallback: T, deadline: &Deadline, label: &str) -> T
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    match run_with_deadline(op, deadline).await {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(
                label,
                error = %e,
                deadline = %deadline,
                "⚠️ Operation failed, using fallback value"
            );
            fallback
        }
    }
}

/// Like [`run_safe`], but an `Ok(None)` from the operation also yields `fallback`.
pub async fn run_safe_optional<T, F>(op: F, fallback: T, deadline: &Deadline, label: &str) -> T
where
    F: Future<Output = Result<Option<T>>> + Send + 'static,
    T: Send + 'static,
{
    match run_with_deadline(op, deadline).await {
        Ok(Some(value)) => value,
        Ok(None) => {
            tracing::warn!(label, deadline = %deadline, "⚠️ Operation returned no value, using fallback");
            fallback
        }
        Err(e) => {
            tracing::warn!(
                label,
                error = %e,
                deadline = %deadline,
                "⚠️ Operation failed, using fallback value"
            );
            fallback
        }
    }
}
