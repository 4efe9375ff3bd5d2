use std::sync::Arc;
use std::time::Duration;

use booktrade_inventory::{refresh, InventoryView, LedgerClient};
use booktrade_models::TransactionRecord;
use tracing::{info, warn};

use crate::error::NegotiationError;

/// Hands completed trades to the ledger and, on confirmation, refreshes the
/// local inventory wholesale. Nothing is mutated locally before the ledger
/// confirms, so a failed or timed-out commit needs no rollback: the attempt
/// is simply abandoned.
pub struct TransactionCommitter {
    ledger: Arc<dyn LedgerClient>,
    inventory: InventoryView,
    ledger_timeout: Duration,
}

impl TransactionCommitter {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        inventory: InventoryView,
        ledger_timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            inventory,
            ledger_timeout,
        }
    }

    pub async fn submit(&self, record: TransactionRecord) -> Result<(), NegotiationError> {
        let timeout_ms = self.ledger_timeout.as_millis() as u64;

        let confirmation = tokio::time::timeout(
            self.ledger_timeout,
            self.ledger.make_transaction(&record),
        )
        .await
        .map_err(|_| NegotiationError::CommitTimeout(timeout_ms))?
        .map_err(|e| {
            warn!(
                conversation = %record.conversation_id,
                counterpart = %record.receiver,
                error = %e,
                "Ledger rejected transaction, abandoning trade"
            );
            NegotiationError::from(e)
        })?;

        info!(
            conversation = %confirmation.conversation_id,
            counterpart = %record.receiver,
            sending_money = %record.sending_money,
            receiving_money = %record.receiving_money,
            "Transaction confirmed"
        );

        // The confirmed state lives in the ledger; re-read it wholesale. A
        // refresh failure leaves the (now stale) cache in place, to be
        // corrected by the next successful refresh.
        match tokio::time::timeout(
            self.ledger_timeout,
            refresh(&self.inventory, self.ledger.as_ref()),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Post-commit inventory refresh failed"),
            Err(_) => warn!("Post-commit inventory refresh timed out"),
        }

        Ok(())
    }
}
