// Reconciliation between the session claim and the authoritative store.
//
// The claim and the store row are written by independent paths, so a claim can run
// ahead of the row it describes. The engine walks a small state machine:
//
// ClaimCheck ─ HasNot  ─> ExistenceCheck ─ absent ─> ClaimConfirmedAbsent
//            │                           └ found  ─> DirectLoad(retry)
//            ├ Has     ─> DirectLoad(retry)  ─ fail ─> RetryLoop(1..=max) ─> Exhausted
//            └ Unknown ─> DirectLoad(once)   ─ fail ─> ClaimConfirmedAbsent | Exhausted
//
// A claim read that stalls or crashes counts as Unknown. A crashed load ends the walk
// without retrying. Every successful resolution is followed by a best-effort claim write
// whose failure is only logged.

use crate::core::deadline::{run_with_deadline, Deadline};
use crate::core::retry::RetryPolicy;
use crate::domain::model::{Claim, Filter, Record};
use crate::domain::ports::{ClaimsStore, RecordStore};
use crate::utils::error::{ErrorCategory, Result, SyncError};
use crate::utils::validation::validate_identifier;
use serde_json::Value;
use std::sync::Arc;

/// Where the reconciled record lives and which claim describes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileTarget {
    pub table: String,
    pub owner_column: String,
    pub claim_key: String,
}

impl ReconcileTarget {
    pub fn new(
        table: impl Into<String>,
        owner_column: impl Into<String>,
        claim_key: impl Into<String>,
    ) -> Result<Self> {
        let target = Self {
            table: table.into(),
            owner_column: owner_column.into(),
            claim_key: claim_key.into(),
        };
        validate_identifier("reconcile.table", &target.table)?;
        validate_identifier("reconcile.owner_column", &target.owner_column)?;
        validate_identifier("reconcile.claim_key", &target.claim_key)?;
        Ok(target)
    }

    pub fn filter_for(&self, owner_key: &str) -> Filter {
        Filter::eq(self.owner_column.clone(), owner_key)
    }
}

#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    /// Budget for the first load and for the existence check.
    pub load_deadline: Deadline,
    /// Budget for each retry; shorter than the outer request deadline.
    pub retry_load_deadline: Deadline,
    /// Budget for reading the session claim. A miss reads as `Claim::Unknown`.
    pub claim_read_deadline: Deadline,
    pub claim_write_deadline: Deadline,
    pub policy: RetryPolicy,
}

#[derive(Debug)]
pub enum ReconciliationOutcome {
    Resolved(Record),
    ClaimConfirmedAbsent,
    /// Every allowed attempt failed. Always transient, never a permanent absence.
    Exhausted { attempts: u32, last_error: SyncError },
}

impl ReconciliationOutcome {
    pub fn is_resolved(&self) -> bool {
        matches!(self, ReconciliationOutcome::Resolved(_))
    }

    pub fn record(&self) -> Option<&Record> {
        match self {
            ReconciliationOutcome::Resolved(record) => Some(record),
            _ => None,
        }
    }

    /// Non-technical text for the UI. Raw error text stays in the logs.
    pub fn user_message(&self) -> &'static str {
        match self {
            ReconciliationOutcome::Resolved(_) => "Your shop is ready.",
            ReconciliationOutcome::ClaimConfirmedAbsent => "You don't have a shop yet.",
            ReconciliationOutcome::Exhausted { last_error, .. } => match last_error.category() {
                ErrorCategory::NotFound | ErrorCategory::Timeout => {
                    "Your shop data is still being created. Refresh in a few seconds."
                }
                _ => "We couldn't load your shop right now. Please try again.",
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimWrite {
    NotAttempted,
    Succeeded,
    Failed,
}

/// Outcome of one reconciliation plus what it took to get there.
#[derive(Debug)]
pub struct Reconciliation {
    pub outcome: ReconciliationOutcome,
    pub claim: Claim,
    /// Backoff sleeps taken, one per retry attempt.
    pub retries: u32,
    pub claim_write: ClaimWrite,
}

#[derive(Debug)]
enum Step {
    ClaimCheck,
    ExistenceCheck,
    DirectLoad { retry_on_failure: bool },
    RetryLoop { attempt: u32, last_error: SyncError },
    Done(ReconciliationOutcome),
}

/// Transition out of `ClaimCheck`.
fn after_claim_check(claim: Claim) -> Step {
    match claim {
        Claim::HasNot => Step::ExistenceCheck,
        Claim::Has => Step::DirectLoad {
            retry_on_failure: true,
        },
        Claim::Unknown => Step::DirectLoad {
            retry_on_failure: false,
        },
    }
}

/// Transition out of `ExistenceCheck`. A store error is never read as absence.
fn after_existence_check(result: Result<bool>) -> Step {
    match result {
        Ok(false) => Step::Done(ReconciliationOutcome::ClaimConfirmedAbsent),
        Ok(true) => Step::DirectLoad {
            retry_on_failure: true,
        },
        Err(e) => Step::Done(ReconciliationOutcome::Exhausted {
            attempts: 0,
            last_error: e,
        }),
    }
}

/// Transition out of a failed `DirectLoad`.
///
/// Only a positive claim signals a propagation race worth retrying. Without one, a
/// not-found is taken at face value. A crashed load is never retried.
fn after_failed_load(retry_on_failure: bool, error: SyncError) -> Step {
    if retry_on_failure && error.is_transient() {
        return Step::RetryLoop {
            attempt: 1,
            last_error: error,
        };
    }
    if error.is_not_found() {
        Step::Done(ReconciliationOutcome::ClaimConfirmedAbsent)
    } else {
        Step::Done(ReconciliationOutcome::Exhausted {
            attempts: 0,
            last_error: error,
        })
    }
}

pub struct Reconciler {
    records: Arc<dyn RecordStore>,
    claims: Arc<dyn ClaimsStore>,
    target: ReconcileTarget,
    settings: ReconcileSettings,
}

impl Reconciler {
    pub fn new(
        records: Arc<dyn RecordStore>,
        claims: Arc<dyn ClaimsStore>,
        target: ReconcileTarget,
        settings: ReconcileSettings,
    ) -> Self {
        Self {
            records,
            claims,
            target,
            settings,
        }
    }

    pub fn target(&self) -> &ReconcileTarget {
        &self.target
    }

    pub async fn reconcile(&self, owner_key: &str) -> ReconciliationOutcome {
        self.reconcile_with_report(owner_key).await.outcome
    }

    pub async fn reconcile_with_report(&self, owner_key: &str) -> Reconciliation {
        let mut claim = Claim::Unknown;
        let mut retries = 0u32;
        let mut step = Step::ClaimCheck;

        let outcome = loop {
            step = match step {
                Step::ClaimCheck => {
                    claim = self.read_claim(owner_key).await;
                    tracing::debug!(owner = owner_key, ?claim, "Claim checked");
                    after_claim_check(claim)
                }
                Step::ExistenceCheck => {
                    let result = self.check_exists(owner_key).await;
                    if matches!(result, Ok(true)) {
                        tracing::warn!(
                            owner = owner_key,
                            table = %self.target.table,
                            "🔄 Claim says absent but the store has a row, healing"
                        );
                    }
                    after_existence_check(result)
                }
                Step::DirectLoad { retry_on_failure } => {
                    match self.load(owner_key, &self.settings.load_deadline).await {
                        Ok(record) => Step::Done(ReconciliationOutcome::Resolved(record)),
                        Err(e) => {
                            tracing::debug!(owner = owner_key, error = %e, retry_on_failure, "Direct load failed");
                            after_failed_load(retry_on_failure, e)
                        }
                    }
                }
                Step::RetryLoop {
                    attempt,
                    last_error,
                } => {
                    if attempt > self.settings.policy.max_attempts() {
                        Step::Done(ReconciliationOutcome::Exhausted {
                            attempts: attempt - 1,
                            last_error,
                        })
                    } else {
                        let delay = self.settings.policy.backoff(attempt);
                        tracing::info!(
                            owner = owner_key,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            last_error = %last_error,
                            "⏳ Record not visible yet, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        retries += 1;
                        match self
                            .load(owner_key, &self.settings.retry_load_deadline)
                            .await
                        {
                            Ok(record) => Step::Done(ReconciliationOutcome::Resolved(record)),
                            Err(e) if !e.is_transient() => {
                                Step::Done(ReconciliationOutcome::Exhausted {
                                    attempts: attempt,
                                    last_error: e,
                                })
                            }
                            Err(e) => Step::RetryLoop {
                                attempt: attempt + 1,
                                last_error: e,
                            },
                        }
                    }
                }
                Step::Done(outcome) => break outcome,
            };
        };

        let claim_write = match &outcome {
            ReconciliationOutcome::Resolved(_) => self.correct_claim(owner_key).await,
            _ => ClaimWrite::NotAttempted,
        };

        match &outcome {
            ReconciliationOutcome::Resolved(_) => {
                tracing::info!(owner = owner_key, retries, "✅ Record resolved")
            }
            ReconciliationOutcome::ClaimConfirmedAbsent => {
                tracing::debug!(owner = owner_key, "No record for owner")
            }
            ReconciliationOutcome::Exhausted {
                attempts,
                last_error,
            } => tracing::warn!(
                owner = owner_key,
                attempts,
                error = %last_error,
                "⚠️ Reconciliation exhausted, reporting as still propagating"
            ),
        }

        Reconciliation {
            outcome,
            claim,
            retries,
            claim_write,
        }
    }

    /// Reads the session claim under its own deadline. A stall or crash reads as `Unknown`.
    async fn read_claim(&self, owner_key: &str) -> Claim {
        let claims = Arc::clone(&self.claims);
        let key = self.target.claim_key.clone();
        let read = async move { Ok(claims.get_claim(&key).await) };

        match run_with_deadline(read, &self.settings.claim_read_deadline).await {
            Ok(value) => Claim::from_value(value.as_ref()),
            Err(e) => {
                tracing::warn!(
                    owner = owner_key,
                    claim = %self.target.claim_key,
                    error = %e,
                    deadline = %self.settings.claim_read_deadline,
                    "⚠️ Claim read failed, treating claim as unknown"
                );
                Claim::Unknown
            }
        }
    }

    async fn check_exists(&self, owner_key: &str) -> Result<bool> {
        let store = Arc::clone(&self.records);
        let table = self.target.table.clone();
        let filter = self.target.filter_for(owner_key);
        let deadline = self.settings.load_deadline.relabel("reconcile.existence_check");
        run_with_deadline(async move { store.exists(&table, &filter).await }, &deadline).await
    }

    async fn load(&self, owner_key: &str, deadline: &Deadline) -> Result<Record> {
        let store = Arc::clone(&self.records);
        let table = self.target.table.clone();
        let filter = self.target.filter_for(owner_key);
        run_with_deadline(async move { store.fetch_one(&table, &filter).await }, deadline).await
    }

    async fn correct_claim(&self, owner_key: &str) -> ClaimWrite {
        let claims = Arc::clone(&self.claims);
        let key = self.target.claim_key.clone();
        let write = async move { claims.set_claim(&key, Value::Bool(true)).await };

        match run_with_deadline(write, &self.settings.claim_write_deadline).await {
            Ok(()) => ClaimWrite::Succeeded,
            Err(e) => {
                tracing::warn!(
                    owner = owner_key,
                    claim = %self.target.claim_key,
                    error = %e,
                    "⚠️ Claim correction failed, will retry on a later read"
                );
                ClaimWrite::Failed
            }
        }
    }
}
