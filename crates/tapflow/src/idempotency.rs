//! Delivery de-duplication.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::store::DeliveryLedger;

/// Admits each platform message id at most once.
#[derive(Clone)]
pub struct IdempotencyGate {
    ledger: Arc<dyn DeliveryLedger>,
}

impl IdempotencyGate {
    pub fn new(ledger: Arc<dyn DeliveryLedger>) -> Self {
        Self { ledger }
    }

    /// Record `message_id` and report whether it is being seen for the first time.
    ///
    /// A missing id is treated as fresh. The insert is never retried: a
    /// duplicate-key failure is the de-dup signal, and any other storage error
    /// is reported as not fresh so the message is dropped rather than
    /// processed twice.
    pub async fn admit(&self, message_id: Option<&str>) -> bool {
        let Some(message_id) = message_id.filter(|id| !id.is_empty()) else {
            return true;
        };

        match self.ledger.record_delivery(message_id).await {
            Ok(()) => true,
            Err(e) if e.is_duplicate() => {
                debug!(message_id, "Duplicate delivery ignored");
                false
            }
            Err(e) => {
                warn!(message_id, error = %e, "Delivery ledger insert failed, dropping message");
                false
            }
        }
    }
}
