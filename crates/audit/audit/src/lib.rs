//! Observability sink for operational failures that are reported to
//! operators instead of to the caller.

pub mod error;
pub mod record;
pub mod store;

pub use error::AuditError;
pub use record::{EventOutcome, OperationEvent};
pub use store::AuditStore;
