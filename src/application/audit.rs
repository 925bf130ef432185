use crate::domain::ports::LedgerClientRef;
use chrono::Utc;
use serde_json::{Value, json};
use tracing::{debug, warn};

/// Append-only audit log on a ledger topic.
///
/// Submission is best effort: a failed submission is logged and the
/// business operation that produced the event still succeeds.
pub struct AuditTrail {
    ledger: LedgerClientRef,
    topic: Option<String>,
}

impl AuditTrail {
    pub fn new(ledger: LedgerClientRef, topic: Option<String>) -> Self {
        Self { ledger, topic }
    }

    pub async fn record(&self, event: &str, details: Value) {
        let Some(topic) = &self.topic else {
            debug!(event, "audit topic not configured; skipping");
            return;
        };
        let message = json!({
            "event": event,
            "at": Utc::now(),
            "details": details,
        });
        match self.ledger.submit_message(topic, message.to_string()).await {
            Ok(sequence) => debug!(event, sequence, "audit event recorded"),
            Err(e) => warn!(event, error = %e, "failed to record audit event"),
        }
    }
}
