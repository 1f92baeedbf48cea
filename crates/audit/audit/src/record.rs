use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How an audited operation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOutcome {
    /// Failed part way; `confirmed_ids` lists what was done before the failure.
    Failed,
}

/// One operational event, kept so operators can reconcile partial work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationEvent {
    /// Unique identifier (UUID v4).
    pub id: String,
    /// Operation name, e.g. `bulk_delete`.
    pub operation: String,
    pub outcome: EventOutcome,
    /// Rendered error for failed operations.
    pub error: Option<String>,
    /// Every id the operation was asked to handle.
    pub input_ids: Vec<String>,
    /// Ids the operation confirmed handled before it stopped.
    pub confirmed_ids: Vec<String>,
    pub occurred_at: DateTime<Utc>,
}

impl OperationEvent {
    /// A failure event carrying the error and the complete input.
    pub fn failure(
        operation: impl Into<String>,
        error: impl std::fmt::Display,
        input_ids: Vec<String>,
        confirmed_ids: Vec<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            operation: operation.into(),
            outcome: EventOutcome::Failed,
            error: Some(error.to_string()),
            input_ids,
            confirmed_ids,
            occurred_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_event_keeps_full_input() {
        let event = OperationEvent::failure(
            "bulk_delete",
            "storage error: boom",
            vec!["a".into(), "b".into()],
            vec!["a".into()],
        );
        assert_eq!(event.outcome, EventOutcome::Failed);
        assert_eq!(event.error.as_deref(), Some("storage error: boom"));
        assert_eq!(event.input_ids, vec!["a", "b"]);
        assert_eq!(event.confirmed_ids, vec!["a"]);
    }

    #[test]
    fn outcome_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(EventOutcome::Failed).unwrap(),
            serde_json::json!("failed")
        );
    }
}
