pub mod aggregate;
pub mod deadline;
pub mod fallback;
pub mod reconcile;
pub mod retry;

pub use crate::domain::model::{Claim, Filter, Record};
pub use crate::domain::ports::{ClaimsStore, RecordStore};
pub use crate::utils::error::Result;
