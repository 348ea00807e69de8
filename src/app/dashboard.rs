// Owner dashboard assembly.
//
// Resolves the owner's shop through the reconciler, then loads the independent shop
// statistics in one aggregate pass. Statistics that fail fall back to zero and are listed
// in `degraded_fields`; the caller always gets a `DashboardState`, never an error.

use crate::config::toml_config::{DashboardConfig, SyncConfig};
use crate::core::aggregate::{run_all, AggregateRequest};
use crate::core::deadline::Deadline;
use crate::core::fallback::run_safe_optional;
use crate::core::reconcile::{Reconciler, ReconciliationOutcome};
use crate::domain::model::{Filter, Record};
use crate::domain::ports::{ClaimsStore, RecordStore};
use crate::utils::error::{Result, SyncError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const STAT_LISTINGS: &str = "listings";
pub const STAT_AVAILABLE_LISTINGS: &str = "available_listings";
pub const STAT_ACTIVE_RENTALS: &str = "active_rentals";
pub const STAT_PENDING_REQUESTS: &str = "pending_requests";
pub const STAT_REVIEWS: &str = "reviews";

#[derive(Debug, Clone)]
pub struct DashboardSettings {
    /// Shared budget for the whole statistics pass.
    pub deadline: Deadline,
    pub optional_deadline: Deadline,
    /// Column holding the shop's primary key.
    pub id_column: String,
    pub tables: DashboardConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub listings: u64,
    pub available_listings: u64,
    pub active_rentals: u64,
    pub pending_requests: u64,
    pub reviews: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub shop_id: String,
    pub shop: Record,
    pub stats: DashboardStats,
    pub average_rating: f64,
    /// Statistics that could not be loaded and show their fallback value.
    pub degraded_fields: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DashboardState {
    Ready(DashboardView),
    NoShop,
    /// The shop exists on the session but is not visible in the store yet.
    Pending { message: String },
    Unavailable { message: String },
    /// Another assembly is already running for this session.
    Busy,
}

/// Clears the in-flight flag when dropped, including during unwinding.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// One assembler per caller session.
pub struct DashboardAssembler {
    records: Arc<dyn RecordStore>,
    reconciler: Reconciler,
    settings: DashboardSettings,
    in_flight: AtomicBool,
}

impl DashboardAssembler {
    pub fn new(
        records: Arc<dyn RecordStore>,
        claims: Arc<dyn ClaimsStore>,
        config: &SyncConfig,
    ) -> Result<Self> {
        let reconciler = Reconciler::new(
            Arc::clone(&records),
            claims,
            config.reconcile_target()?,
            config.reconcile_settings()?,
        );
        Ok(Self::with_reconciler(
            records,
            reconciler,
            config.dashboard_settings()?,
        ))
    }

    pub fn with_reconciler(
        records: Arc<dyn RecordStore>,
        reconciler: Reconciler,
        settings: DashboardSettings,
    ) -> Self {
        Self {
            records,
            reconciler,
            settings,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub async fn assemble(&self, owner_key: &str) -> DashboardState {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            tracing::debug!(owner = owner_key, "Dashboard assembly already in flight");
            return DashboardState::Busy;
        };

        tracing::info!(owner = owner_key, "📊 Assembling dashboard");

        let outcome = self.reconciler.reconcile(owner_key).await;
        let shop = match outcome {
            ReconciliationOutcome::Resolved(shop) => shop,
            ReconciliationOutcome::ClaimConfirmedAbsent => return DashboardState::NoShop,
            exhausted @ ReconciliationOutcome::Exhausted { .. } => {
                let message = exhausted.user_message().to_string();
                return match &exhausted {
                    ReconciliationOutcome::Exhausted { last_error, .. }
                        if last_error.is_not_found() || last_error.is_timeout() =>
                    {
                        DashboardState::Pending { message }
                    }
                    _ => DashboardState::Unavailable { message },
                };
            }
        };

        let Some(shop_id) = extract_shop_id(&shop, &self.settings.id_column) else {
            tracing::error!(
                owner = owner_key,
                column = %self.settings.id_column,
                "❌ Resolved shop row has no usable id"
            );
            return DashboardState::Unavailable {
                message: "We couldn't load your shop right now. Please try again.".to_string(),
            };
        };

        let (stats, degraded_fields) = self.load_stats(&shop_id).await;
        let average_rating = self.load_average_rating(&shop_id).await;

        DashboardState::Ready(DashboardView {
            shop_id,
            shop,
            stats,
            average_rating,
            degraded_fields,
            generated_at: Utc::now(),
        })
    }

    fn count_op(
        &self,
        table: &str,
        filter: Filter,
    ) -> impl std::future::Future<Output = Result<u64>> + Send + 'static {
        let store = Arc::clone(&self.records);
        let table = table.to_string();
        async move { store.count(&table, &filter).await }
    }

    async fn load_stats(&self, shop_id: &str) -> (DashboardStats, Vec<String>) {
        let tables = &self.settings.tables;
        let by_shop = Filter::eq(tables.shop_column.clone(), shop_id);

        let mut request = AggregateRequest::new();
        let branches = [
            (STAT_LISTINGS, &tables.listings_table, by_shop.clone()),
            (
                STAT_AVAILABLE_LISTINGS,
                &tables.listings_table,
                by_shop.clone().and_eq("status", "available"),
            ),
            (
                STAT_ACTIVE_RENTALS,
                &tables.rentals_table,
                by_shop.clone().and_eq("status", "active"),
            ),
            (
                STAT_PENDING_REQUESTS,
                &tables.requests_table,
                by_shop.clone().and_eq("status", "pending"),
            ),
            (STAT_REVIEWS, &tables.reviews_table, by_shop),
        ];
        for (key, table, filter) in branches {
            let op = self.count_op(table, filter);
            if let Err(e) = request.add(key, op) {
                tracing::error!(error = %e, "❌ Could not schedule dashboard statistic");
            }
        }

        let mut result = run_all(request, &self.settings.deadline).await;
        let degraded_fields = result.failed_keys();
        for key in &degraded_fields {
            if let Some(e) = result.error(key) {
                tracing::warn!(label = %key, error = %e, "⚠️ Statistic degraded to fallback");
            }
        }

        let stats = DashboardStats {
            listings: result.value_or(STAT_LISTINGS, 0),
            available_listings: result.value_or(STAT_AVAILABLE_LISTINGS, 0),
            active_rentals: result.value_or(STAT_ACTIVE_RENTALS, 0),
            pending_requests: result.value_or(STAT_PENDING_REQUESTS, 0),
            reviews: result.value_or(STAT_REVIEWS, 0),
        };
        (stats, degraded_fields)
    }

    async fn load_average_rating(&self, shop_id: &str) -> f64 {
        let store = Arc::clone(&self.records);
        let table = self.settings.tables.reviews_table.clone();
        let filter = Filter::eq(self.settings.tables.shop_column.clone(), shop_id);

        let op = async move {
            let reviews = store.query(&table, &filter).await?;
            Ok::<_, SyncError>(average_of(&reviews, "rating"))
        };
        run_safe_optional(op, 0.0, &self.settings.optional_deadline, "average_rating").await
    }
}

fn extract_shop_id(shop: &Record, column: &str) -> Option<String> {
    match shop.get(column)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Mean of a numeric field; `None` when no row carries it.
fn average_of(rows: &[Record], field: &str) -> Option<f64> {
    let values: Vec<f64> = rows.iter().filter_map(|r| r.get_f64(field)).collect();
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_guard_is_exclusive_and_released_on_drop() {
        let flag = AtomicBool::new(false);
        let guard = InFlightGuard::acquire(&flag).unwrap();
        assert!(InFlightGuard::acquire(&flag).is_none());
        drop(guard);
        assert!(InFlightGuard::acquire(&flag).is_some());
        assert!(!flag.load(Ordering::Acquire));
    }

    #[test]
    fn test_guard_released_during_unwind() {
        let flag = AtomicBool::new(false);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = InFlightGuard::acquire(&flag).unwrap();
            panic!("render failed");
        }));
        assert!(result.is_err());
        assert!(!flag.load(Ordering::Acquire));
    }

    #[test]
    fn test_shop_id_accepts_numbers_and_strings() {
        let numeric = Record::from_json(json!({"id": 42})).unwrap();
        let text = Record::from_json(json!({"id": "b7f1"})).unwrap();
        let missing = Record::from_json(json!({"name": "Camera Corner"})).unwrap();
        assert_eq!(extract_shop_id(&numeric, "id").as_deref(), Some("42"));
        assert_eq!(extract_shop_id(&text, "id").as_deref(), Some("b7f1"));
        assert_eq!(extract_shop_id(&missing, "id"), None);
    }

    #[test]
    fn test_average_of() {
        let rows: Vec<Record> = [json!({"rating": 4}), json!({"rating": 5}), json!({"note": "x"})]
            .into_iter()
            .filter_map(Record::from_json)
            .collect();
        assert_eq!(average_of(&rows, "rating"), Some(4.5));
        assert_eq!(average_of(&[], "rating"), None);
    }
}
