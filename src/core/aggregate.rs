// Parallel aggregator.
//
// Every branch of an `AggregateRequest` runs as its own task and all of them share
// one deadline. The result always holds exactly one entry per requested key: branches
// that finished keep their real outcome, the rest are recorded as timeouts.

use crate::core::deadline::{describe_join_error, Deadline};
use crate::utils::error::{Result, SyncError};
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use tokio::time::Instant;

pub type BoxOperation<T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'static>>;

/// Independent operations keyed by caller-chosen, unique names.
pub struct AggregateRequest<T> {
    keys: HashSet<String>,
    operations: Vec<(String, BoxOperation<T>)>,
}

impl<T: Send + 'static> AggregateRequest<T> {
    pub fn new() -> Self {
        Self {
            keys: HashSet::new(),
            operations: Vec::new(),
        }
    }

    pub fn add<F>(&mut self, key: impl Into<String>, op: F) -> Result<()>
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let key = key.into();
        if !self.keys.insert(key.clone()) {
            return Err(SyncError::DuplicateKey { key });
        }
        self.operations.push((key, Box::pin(op)));
        Ok(())
    }

    /// Builder form of [`AggregateRequest::add`].
    pub fn with<F>(mut self, key: impl Into<String>, op: F) -> Result<Self>
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        self.add(key, op)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.keys.contains(key)
    }
}

impl<T: Send + 'static> Default for AggregateRequest<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-key outcomes of one [`run_all`] call.
#[derive(Debug)]
pub struct AggregateResult<T> {
    entries: HashMap<String, Result<T>>,
}

impl<T> AggregateResult<T> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Result<T>> {
        self.entries.get(key)
    }

    pub fn value(&self, key: &str) -> Option<&T> {
        self.entries.get(key).and_then(|r| r.as_ref().ok())
    }

    pub fn error(&self, key: &str) -> Option<&SyncError> {
        self.entries.get(key).and_then(|r| r.as_ref().err())
    }

    pub fn take(&mut self, key: &str) -> Option<Result<T>> {
        self.entries.remove(key)
    }

    /// Removes the entry for `key`, substituting `fallback` when it failed.
    pub fn value_or(&mut self, key: &str, fallback: T) -> T {
        match self.entries.remove(key) {
            Some(Ok(value)) => value,
            _ => fallback,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Keys whose branch failed, sorted for stable reporting.
    pub fn failed_keys(&self) -> Vec<String> {
        let mut failed: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, r)| r.is_err())
            .map(|(k, _)| k.clone())
            .collect();
        failed.sort();
        failed
    }

    pub fn into_inner(self) -> HashMap<String, Result<T>> {
        self.entries
    }
}

/// Runs every operation in `request` concurrently under one shared `deadline`.
///
/// Returns once all branches finished or the deadline elapsed, whichever comes first.
/// Pending branches are detached, not aborted.
pub async fn run_all<T: Send + 'static>(
    request: AggregateRequest<T>,
    deadline: &Deadline,
) -> AggregateResult<T> {
    let started = Instant::now();
    let total = request.operations.len();
    let mut entries: HashMap<String, Result<T>> = HashMap::with_capacity(total);

    let mut branches = FuturesUnordered::new();
    for (key, op) in request.operations {
        let handle = tokio::spawn(op);
        branches.push(async move { (key, handle.await) });
    }

    let expiry = tokio::time::sleep(deadline.duration());
    tokio::pin!(expiry);

    loop {
        tokio::select! {
            biased;
            next = branches.next() => match next {
                Some((key, Ok(result))) => {
                    if let Err(e) = &result {
                        tracing::debug!(key = %key, error = %e, "Aggregate branch failed");
                    }
                    entries.insert(key, result);
                }
                Some((key, Err(join_error))) => {
                    let message = describe_join_error(join_error);
                    tracing::warn!(key = %key, %message, "⚠️ Aggregate branch crashed");
                    entries.insert(
                        key.clone(),
                        Err(SyncError::OperationFailed { label: key, message }),
                    );
                }
                None => break,
            },
            _ = &mut expiry => break,
        }
    }

    if entries.len() < total {
        let elapsed = started.elapsed();
        let pending: Vec<String> = request
            .keys
            .into_iter()
            .filter(|key| !entries.contains_key(key))
            .collect();
        tracing::warn!(
            deadline = %deadline,
            pending = pending.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "⏱️ Aggregate deadline elapsed with branches still pending"
        );
        for key in pending {
            let label = format!("{}:{}", deadline.label(), key);
            entries.insert(key, Err(SyncError::timeout(label, elapsed)));
        }
    }

    AggregateResult { entries }
}
