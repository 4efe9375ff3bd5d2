pub mod book;
pub mod config;
pub mod messages;
pub mod transaction;

pub use book::{Book, Catalog, Goal};
pub use config::{CatalogConfig, CatalogEntry, PeerConfig, TradingConfig};
pub use messages::{
    Acceptance, CallForProposals, CfpReply, Offer, OfferDecision, PeerInfo, ProposalSet,
    TradeConfirmation,
};
pub use transaction::TransactionRecord;

/// Directory service type under which trading peers register.
pub const BOOK_TRADER_SERVICE: &str = "book-trader";
