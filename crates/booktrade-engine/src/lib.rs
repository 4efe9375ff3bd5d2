//! The negotiation and decision engine of a book-trading peer.
//!
//! One peer runs many concurrent protocol instances: a scheduler launches a
//! buyer round per unmet goal every tick, while a responder service answers
//! inbound calls-for-proposals, all against a shared inventory view that is
//! only ever replaced wholesale after a ledger-confirmed commit.

pub mod committer;
pub mod error;
pub mod evaluator;
pub mod initiator;
pub mod peer;
pub mod pricing;
pub mod responder;
pub mod scheduler;
pub mod transport;

pub mod test_support;

pub use committer::TransactionCommitter;
pub use error::NegotiationError;
pub use initiator::{run_round, InitiatorContext, RoundOutcome};
pub use peer::{PeerHandle, TradingPeer};
pub use pricing::{PricingPolicy, TradingClock};
pub use responder::{CfpOutcome, PendingSale, Responder, ResponderService};
pub use scheduler::Scheduler;
pub use transport::{Directory, PeerRequest, Transport, TransportError};
