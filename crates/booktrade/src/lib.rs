//! booktrade - autonomous book-trading peers.
//!
//! Each peer holds books, pursues acquisition goals and trades with the
//! other peers over a two-sided contract-net protocol, with prices that
//! shift over the session and an external ledger arbitrating every trade.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use booktrade::models::{Goal, PeerConfig};
//! use booktrade::simulation::{Simulation, SimulationSettings};
//! ```

pub use booktrade_engine as engine;
pub use booktrade_inventory as inventory;
pub use booktrade_models as models;

pub mod simulation;
