use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    #[error("Transaction rejected by ledger: {0}")]
    Rejected(String),

    #[error("Unknown peer: {0}")]
    UnknownPeer(String),
}
