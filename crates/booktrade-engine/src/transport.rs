use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::oneshot;

use booktrade_models::{CallForProposals, CfpReply, OfferDecision, TradeConfirmation};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Peer unreachable: {0}")]
    Unreachable(String),

    #[error("No reply from peer: {0}")]
    NoReply(String),

    #[error("Codec error: {0}")]
    Codec(String),
}

/// Directory lookup for discovering trading counterparts. Assumed eventually
/// consistent; queried fresh at the start of every round.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn find_peers(&self, service_type: &str) -> Result<Vec<String>, TransportError>;
}

/// Outbound half of the message layer: request/response exchanges with
/// explicit deadlines, at-most-once delivery per send, no ordering guarantee
/// across counterparts. Deadline enforcement is the caller's job.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver a call-for-proposals and wait for the propose/refuse answer.
    async fn request_proposals(
        &self,
        peer: &str,
        cfp: CallForProposals,
    ) -> Result<CfpReply, TransportError>;

    /// Deliver an accept/reject decision. An accepted proposal is answered
    /// with a confirmation; rejections and stale acceptances yield `None`.
    async fn send_decision(
        &self,
        peer: &str,
        decision: OfferDecision,
    ) -> Result<Option<TradeConfirmation>, TransportError>;
}

/// Inbound requests delivered to a peer's responder service.
#[derive(Debug)]
pub enum PeerRequest {
    Cfp {
        cfp: CallForProposals,
        reply: oneshot::Sender<CfpReply>,
    },
    Decision {
        decision: OfferDecision,
        reply: oneshot::Sender<Option<TradeConfirmation>>,
    },
}
