use crate::domain::model::{Filter, Record};
use crate::utils::error::{Result, SyncError};
use async_trait::async_trait;
use serde_json::Value;

/// Read side of the hosted relational store.
///
/// Implementations must report an explicit absence as [`SyncError::NotFound`] so it
/// stays distinguishable from transport and auth failures.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn query(&self, table: &str, filter: &Filter) -> Result<Vec<Record>>;

    async fn fetch_one(&self, table: &str, filter: &Filter) -> Result<Record> {
        let rows = self.query(table, &filter.clone().with_limit(1)).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| SyncError::not_found(table))
    }

    async fn exists(&self, table: &str, filter: &Filter) -> Result<bool> {
        match self.fetch_one(table, filter).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn count(&self, table: &str, filter: &Filter) -> Result<u64> {
        let rows = self.query(table, filter).await?;
        Ok(rows.len() as u64)
    }
}

/// Claims cached on the caller's session.
#[async_trait]
pub trait ClaimsStore: Send + Sync {
    async fn get_claim(&self, key: &str) -> Option<Value>;

    /// Fire-and-forget from the engine's point of view; errors are only logged.
    async fn set_claim(&self, key: &str, value: Value) -> Result<()>;
}
