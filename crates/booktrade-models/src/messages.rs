use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::book::{Book, Goal};

/// What one side hands over in a trade: money plus any books demanded in
/// exchange. Barter money may be negative (the proposer pays the difference).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Offer {
    pub money: Decimal,
    #[serde(default)]
    pub books: Vec<Book>,
}

impl Offer {
    pub fn cash(money: Decimal) -> Self {
        Self {
            money,
            books: Vec::new(),
        }
    }
}

/// Broadcast by an initiator: "sell me these titles, reply by the deadline".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallForProposals {
    pub conversation_id: Uuid,
    pub from: String,
    pub titles: Vec<String>,
    pub reply_by: DateTime<Utc>,
}

/// A responder's proposal: the books it is willing to sell and the offers it
/// will accept for them. `will_sell` of `None` means the responder declined
/// to name what it sells, which buyers value as unbounded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProposalSet {
    pub conversation_id: Uuid,
    pub will_sell: Option<Vec<Book>>,
    pub offers: Vec<Offer>,
    pub reply_by: DateTime<Utc>,
}

/// Answer to a call-for-proposals. Each CFP is answered exactly once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CfpReply {
    Propose(ProposalSet),
    Refuse { reason: String },
}

/// Selects exactly one offer from a previously received proposal set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Acceptance {
    pub conversation_id: Uuid,
    pub offer: Offer,
}

/// The initiator's verdict on a proposal, sent back to the responder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OfferDecision {
    Accept(Acceptance),
    Reject { conversation_id: Uuid },
}

impl OfferDecision {
    pub fn conversation_id(&self) -> Uuid {
        match self {
            OfferDecision::Accept(acceptance) => acceptance.conversation_id,
            OfferDecision::Reject { conversation_id } => *conversation_id,
        }
    }
}

/// Responder's confirmation that it has processed an acceptance and is
/// committing its half of the trade.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TradeConfirmation {
    pub conversation_id: Uuid,
}

/// The ledger's authoritative answer to a `get_my_info` query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerInfo {
    pub books: Vec<Book>,
    pub goals: Vec<Goal>,
    pub money: Decimal,
}
