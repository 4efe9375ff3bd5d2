use async_trait::async_trait;
use booktrade_models::{PeerInfo, TradeConfirmation, TransactionRecord};
use tracing::debug;

use crate::error::LedgerError;
use crate::snapshot::InventorySnapshot;
use crate::view::InventoryView;

/// Client side of the external ledger service that holds the authoritative
/// inventory, money and goal state. Bound to one peer's identity.
///
/// `make_transaction` is idempotent only insofar as each record carries a
/// unique conversation id; the ledger arbitrates whether a trade is honored.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn get_my_info(&self) -> Result<PeerInfo, LedgerError>;

    async fn make_transaction(
        &self,
        record: &TransactionRecord,
    ) -> Result<TradeConfirmation, LedgerError>;
}

/// Re-read the ledger and replace the local view wholesale.
pub async fn refresh(view: &InventoryView, ledger: &dyn LedgerClient) -> Result<(), LedgerError> {
    let info = ledger.get_my_info().await?;
    debug!(
        books = info.books.len(),
        goals = info.goals.len(),
        money = %info.money,
        "Refreshed inventory from ledger"
    );
    view.replace(InventorySnapshot::from(info));
    Ok(())
}
