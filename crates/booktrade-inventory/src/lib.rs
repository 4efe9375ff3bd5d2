pub mod error;
pub mod ledger;
pub mod snapshot;
pub mod view;

pub use error::LedgerError;
pub use ledger::{refresh, LedgerClient};
pub use snapshot::InventorySnapshot;
pub use view::InventoryView;
