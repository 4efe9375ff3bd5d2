use thiserror::Error;

use crate::transport::TransportError;
use booktrade_inventory::LedgerError;

#[derive(Error, Debug)]
pub enum NegotiationError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Ledger did not confirm within {0} ms")]
    CommitTimeout(u64),

    #[error("Acceptance arrived for an unknown or expired proposal: {0}")]
    StaleAcceptance(uuid::Uuid),
}
