use async_trait::async_trait;
use dashboard_sync::adapters::{Failure, MemoryClaimsStore, MemoryRecordStore};
use dashboard_sync::app::dashboard::{DashboardStats, STAT_REVIEWS};
use dashboard_sync::domain::ports::ClaimsStore;
use dashboard_sync::{DashboardAssembler, DashboardState, SyncConfig, SyncError};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const OWNER: &str = "u-1";

fn seeded_store() -> Arc<MemoryRecordStore> {
    let store = MemoryRecordStore::new();
    store.insert_json("shops", json!({"id": 10, "owner_id": OWNER, "name": "Camera Corner"}));

    store.insert_json("items", json!({"id": 1, "shop_id": 10, "status": "available"}));
    store.insert_json("items", json!({"id": 2, "shop_id": 10, "status": "available"}));
    store.insert_json("items", json!({"id": 3, "shop_id": 10, "status": "rented"}));
    store.insert_json("items", json!({"id": 4, "shop_id": 99, "status": "available"}));

    store.insert_json("rentals", json!({"id": 1, "shop_id": 10, "status": "active"}));
    store.insert_json("rentals", json!({"id": 2, "shop_id": 10, "status": "returned"}));

    store.insert_json("rental_requests", json!({"id": 1, "shop_id": 10, "status": "pending"}));
    store.insert_json("rental_requests", json!({"id": 2, "shop_id": 10, "status": "pending"}));
    store.insert_json("rental_requests", json!({"id": 3, "shop_id": 10, "status": "declined"}));

    store.insert_json("reviews", json!({"id": 1, "shop_id": 10, "rating": 4}));
    store.insert_json("reviews", json!({"id": 2, "shop_id": 10, "rating": 5}));
    Arc::new(store)
}

fn claims(value: Option<Value>) -> Arc<MemoryClaimsStore> {
    Arc::new(match value {
        Some(v) => MemoryClaimsStore::new().with_claim("has_shop", v),
        None => MemoryClaimsStore::new(),
    })
}

fn assembler(records: Arc<MemoryRecordStore>, claims: Arc<dyn ClaimsStore>) -> DashboardAssembler {
    DashboardAssembler::new(records, claims, &SyncConfig::default()).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_ready_dashboard_with_all_stats() {
    let records = seeded_store();
    let assembler = assembler(records, claims(Some(json!(true))));

    let state = assembler.assemble(OWNER).await;

    let DashboardState::Ready(view) = state else {
        panic!("expected Ready, got {:?}", state);
    };
    assert_eq!(view.shop_id, "10");
    assert_eq!(
        view.stats,
        DashboardStats {
            listings: 3,
            available_listings: 2,
            active_rentals: 1,
            pending_requests: 2,
            reviews: 2,
        }
    );
    assert_eq!(view.average_rating, 4.5);
    assert!(view.degraded_fields.is_empty());
    assert!(!assembler.is_in_flight());
}

#[tokio::test(start_paused = true)]
async fn test_slow_statistic_degrades_only_that_field() {
    let records = seeded_store();
    records.fail_always("reviews", Failure::Stall(Duration::from_secs(120)));
    let assembler = assembler(records, claims(Some(json!(true))));

    let started = tokio::time::Instant::now();
    let state = assembler.assemble(OWNER).await;

    let DashboardState::Ready(view) = state else {
        panic!("expected Ready, got {:?}", state);
    };
    assert_eq!(view.degraded_fields, vec![STAT_REVIEWS.to_string()]);
    assert_eq!(view.stats.reviews, 0);
    assert_eq!(view.stats.listings, 3);
    assert_eq!(view.average_rating, 0.0);
    // 8s stats deadline plus the 2s optional rating deadline
    assert!(started.elapsed() < Duration::from_secs(11));
    assert!(!assembler.is_in_flight());
}

#[tokio::test(start_paused = true)]
async fn test_no_shop() {
    let records = Arc::new(MemoryRecordStore::new());
    let assembler = assembler(records, claims(Some(json!(false))));

    assert!(matches!(assembler.assemble(OWNER).await, DashboardState::NoShop));
}

#[tokio::test(start_paused = true)]
async fn test_propagating_shop_reports_pending() {
    let records = Arc::new(MemoryRecordStore::new());
    let assembler = assembler(records, claims(Some(json!(true))));

    match assembler.assemble(OWNER).await {
        DashboardState::Pending { message } => assert!(message.contains("still being created")),
        other => panic!("expected Pending, got {:?}", other),
    }
    assert!(!assembler.is_in_flight());
}

#[tokio::test(start_paused = true)]
async fn test_store_outage_reports_unavailable() {
    let records = seeded_store();
    records.fail_always("shops", Failure::Transport);
    let assembler = assembler(records, claims(Some(json!(true))));

    match assembler.assemble(OWNER).await {
        DashboardState::Unavailable { message } => {
            assert!(!message.contains("scripted failure"));
        }
        other => panic!("expected Unavailable, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_assembly_is_suppressed() {
    let records = seeded_store();
    records.fail_next("shops", Failure::Stall(Duration::from_secs(1)));
    let assembler = Arc::new(assembler(records, claims(Some(json!(true)))));

    let first = {
        let assembler = Arc::clone(&assembler);
        tokio::spawn(async move { assembler.assemble(OWNER).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(assembler.is_in_flight());
    assert!(matches!(assembler.assemble(OWNER).await, DashboardState::Busy));

    let state = first.await.unwrap();
    assert!(matches!(state, DashboardState::Ready(_)));
    assert!(!assembler.is_in_flight());

    // guard released, a new pass runs normally
    assert!(matches!(assembler.assemble(OWNER).await, DashboardState::Ready(_)));
}

struct CrashingClaims;

#[async_trait]
impl ClaimsStore for CrashingClaims {
    async fn get_claim(&self, _key: &str) -> Option<Value> {
        panic!("session store corrupted")
    }

    async fn set_claim(&self, _key: &str, _value: Value) -> Result<(), SyncError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_crashing_claims_store_still_yields_a_state() {
    let assembler = Arc::new(assembler(seeded_store(), Arc::new(CrashingClaims)));

    let handle = {
        let assembler = Arc::clone(&assembler);
        tokio::spawn(async move { assembler.assemble(OWNER).await })
    };
    let state = handle.await.expect("assemble must not panic");

    assert!(matches!(state, DashboardState::Ready(_)));
    assert!(!assembler.is_in_flight());
}

struct StalledClaims;

#[async_trait]
impl ClaimsStore for StalledClaims {
    async fn get_claim(&self, _key: &str) -> Option<Value> {
        std::future::pending().await
    }

    async fn set_claim(&self, _key: &str, _value: Value) -> Result<(), SyncError> {
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn test_stalled_claims_store_does_not_hold_the_guard() {
    let assembler = assembler(seeded_store(), Arc::new(StalledClaims));

    let state = tokio::time::timeout(Duration::from_secs(3600), assembler.assemble(OWNER))
        .await
        .expect("assemble must finish despite a stalled claims store");

    assert!(matches!(state, DashboardState::Ready(_)));
    assert!(!assembler.is_in_flight());
}

#[tokio::test(start_paused = true)]
async fn test_guard_released_after_timeouts() {
    let records = seeded_store();
    for table in ["items", "rentals", "rental_requests", "reviews"] {
        records.fail_always(table, Failure::Stall(Duration::from_secs(600)));
    }
    let assembler = assembler(records, claims(Some(json!(true))));

    let DashboardState::Ready(view) = assembler.assemble(OWNER).await else {
        panic!("expected Ready with fallbacks");
    };
    assert_eq!(view.degraded_fields.len(), 5);
    assert_eq!(view.stats, DashboardStats::default());
    assert!(!assembler.is_in_flight());
}

#[tokio::test(start_paused = true)]
async fn test_state_serializes_with_tag() {
    let assembler = assembler(Arc::new(MemoryRecordStore::new()), claims(None));

    let state = assembler.assemble(OWNER).await;
    let json = serde_json::to_value(&state).unwrap();

    assert_eq!(json["state"], "no_shop");
}
