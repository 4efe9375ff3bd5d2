use std::sync::Arc;
use std::time::Duration;

use booktrade_inventory::{InventorySnapshot, InventoryView};
use booktrade_models::{
    Acceptance, Book, CallForProposals, CfpReply, Goal, Offer, OfferDecision, ProposalSet,
    TradingConfig, TransactionRecord, BOOK_TRADER_SERVICE,
};
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::committer::TransactionCommitter;
use crate::evaluator::{best_offer, feasible_offers, offer_cost, received_valuation};
use crate::pricing::{PricingPolicy, TradingClock};
use crate::transport::{Directory, Transport};

/// Everything a buyer round needs. One context is shared by all rounds of a
/// peer; each round takes its own inventory snapshot from it.
pub struct InitiatorContext {
    pub peer_name: String,
    pub inventory: InventoryView,
    pub pricing: Arc<PricingPolicy>,
    pub clock: TradingClock,
    pub directory: Arc<dyn Directory>,
    pub transport: Arc<dyn Transport>,
    pub committer: Arc<TransactionCommitter>,
    pub config: TradingConfig,
}

/// How one call-for-proposals round ended. Every variant other than `Traded`
/// leaves the goal unmet, to be retried on a later scheduler tick.
#[derive(Debug, PartialEq, Eq)]
pub enum RoundOutcome {
    Traded,
    GoalAlreadyMet,
    NoPeers,
    NoResponses,
    NoAcceptableOffer,
    Abandoned,
}

/// The response chosen by joint evaluation: whose proposal we accept, the
/// offer we will fulfill (demands resolved to our own instances where we can)
/// and the books we expect in return.
#[derive(Debug, Clone)]
pub struct AcceptedProposal {
    pub peer: String,
    pub offer: Offer,
    pub expect_books: Vec<Book>,
}

#[derive(Debug)]
pub struct RoundDecision {
    pub winner: Option<AcceptedProposal>,
    pub rejected: Vec<String>,
}

/// Jointly evaluate all collected responses, in arrival order.
///
/// A response is an acceptance candidate when its feasible set is non-empty
/// and its best offer (ranked over the full set) does not cost more than the
/// named books are worth to us. At most one response per round is accepted;
/// once one is, every later candidate is rejected regardless of merit.
pub fn choose_response(
    responses: &[(String, ProposalSet)],
    snapshot: &InventorySnapshot,
    pricing: &PricingPolicy,
    elapsed: Duration,
    goal_retention_penalty: Decimal,
) -> RoundDecision {
    let mut winner: Option<AcceptedProposal> = None;
    let mut rejected = Vec::new();

    for (peer, proposal) in responses {
        let mut accepted_here = false;

        if winner.is_none() && !feasible_offers(&proposal.offers, snapshot).is_empty() {
            if let Some(best) = best_offer(
                &proposal.offers,
                snapshot,
                pricing,
                elapsed,
                goal_retention_penalty,
            ) {
                let given = offer_cost(best, snapshot, pricing, elapsed, goal_retention_penalty);
                let received =
                    received_valuation(proposal.will_sell.as_deref(), snapshot, pricing, elapsed);
                if received.is_none_or(|value| given <= value) {
                    winner = Some(AcceptedProposal {
                        peer: peer.clone(),
                        offer: resolve_demand(best, snapshot),
                        expect_books: proposal.will_sell.clone().unwrap_or_default(),
                    });
                    accepted_here = true;
                }
            }
        }

        if !accepted_here {
            rejected.push(peer.clone());
        }
    }

    RoundDecision { winner, rejected }
}

/// Bind demanded titles to owned instances where the goal-retention rule
/// allows; unresolvable demands are passed through as bare titles and left
/// for the ledger to judge.
fn resolve_demand(offer: &Offer, snapshot: &InventorySnapshot) -> Offer {
    Offer {
        money: offer.money,
        books: offer
            .books
            .iter()
            .map(|b| {
                snapshot
                    .sellable_instance(&b.title)
                    .cloned()
                    .unwrap_or_else(|| b.clone())
            })
            .collect(),
    }
}

/// Run one complete buyer round for a single unmet goal: broadcast, collect,
/// evaluate, accept at most one, commit.
pub async fn run_round(ctx: &InitiatorContext, goal: &Goal) -> RoundOutcome {
    let snapshot = ctx.inventory.snapshot();
    if snapshot.owns_title(&goal.title) {
        return RoundOutcome::GoalAlreadyMet;
    }

    // Fresh directory query every round; membership is eventually consistent.
    let peers = match ctx.directory.find_peers(BOOK_TRADER_SERVICE).await {
        Ok(peers) => peers,
        Err(e) => {
            warn!(peer = %ctx.peer_name, error = %e, "Directory lookup failed");
            return RoundOutcome::Abandoned;
        }
    };
    let peers: Vec<String> = peers
        .into_iter()
        .filter(|p| *p != ctx.peer_name)
        .collect();
    if peers.is_empty() {
        return RoundOutcome::NoPeers;
    }

    let conversation_id = Uuid::new_v4();
    let deadline = ctx.config.cfp_timeout();
    let cfp = CallForProposals {
        conversation_id,
        from: ctx.peer_name.clone(),
        titles: vec![goal.title.clone()],
        reply_by: Utc::now() + chrono::Duration::milliseconds(deadline.as_millis() as i64),
    };

    debug!(
        peer = %ctx.peer_name,
        goal = %goal.title,
        conversation = %conversation_id,
        recipients = peers.len(),
        "Broadcasting call-for-proposals"
    );

    let mut requests = JoinSet::new();
    for peer in peers {
        let transport = Arc::clone(&ctx.transport);
        let cfp = cfp.clone();
        requests.spawn(async move {
            let reply =
                tokio::time::timeout(deadline, transport.request_proposals(&peer, cfp)).await;
            (peer, reply)
        });
    }

    // Buffer every answer until the deadline or until all recipients replied.
    let mut responses: Vec<(String, ProposalSet)> = Vec::new();
    while let Some(joined) = requests.join_next().await {
        match joined {
            Ok((peer, Ok(Ok(CfpReply::Propose(proposal))))) => responses.push((peer, proposal)),
            Ok((peer, Ok(Ok(CfpReply::Refuse { reason })))) => {
                debug!(%peer, conversation = %conversation_id, %reason, "Peer refused");
            }
            Ok((peer, Ok(Err(e)))) => {
                warn!(%peer, conversation = %conversation_id, error = %e, "Transport fault collecting proposals");
            }
            Ok((peer, Err(_))) => {
                debug!(%peer, conversation = %conversation_id, "No proposal before deadline");
            }
            Err(e) => warn!(error = %e, "Proposal collection task failed"),
        }
    }

    if responses.is_empty() {
        return RoundOutcome::NoResponses;
    }

    let decision = choose_response(
        &responses,
        &snapshot,
        &ctx.pricing,
        ctx.clock.elapsed(),
        ctx.config.goal_retention_penalty,
    );

    // Rejections are best effort; the proposals expire on their own anyway.
    for peer in decision.rejected {
        let transport = Arc::clone(&ctx.transport);
        tokio::spawn(async move {
            if let Err(e) = transport
                .send_decision(&peer, OfferDecision::Reject { conversation_id })
                .await
            {
                debug!(%peer, error = %e, "Failed to deliver rejection");
            }
        });
    }

    let Some(accepted) = decision.winner else {
        return RoundOutcome::NoAcceptableOffer;
    };

    info!(
        peer = %ctx.peer_name,
        goal = %goal.title,
        conversation = %conversation_id,
        seller = %accepted.peer,
        money = %accepted.offer.money,
        "Accepting offer"
    );

    let acceptance = OfferDecision::Accept(Acceptance {
        conversation_id,
        offer: accepted.offer.clone(),
    });
    let confirmation = tokio::time::timeout(
        deadline,
        ctx.transport.send_decision(&accepted.peer, acceptance),
    )
    .await;

    match confirmation {
        Ok(Ok(Some(confirmation))) if confirmation.conversation_id == conversation_id => {
            let record = TransactionRecord {
                sender: ctx.peer_name.clone(),
                receiver: accepted.peer.clone(),
                conversation_id,
                sending_books: accepted.offer.books.clone(),
                sending_money: accepted.offer.money,
                receiving_books: accepted.expect_books.clone(),
                receiving_money: Decimal::ZERO,
            };
            match ctx.committer.submit(record).await {
                Ok(()) => RoundOutcome::Traded,
                Err(e) => {
                    warn!(
                        peer = %ctx.peer_name,
                        conversation = %conversation_id,
                        error = %e,
                        "Accepted trade did not commit"
                    );
                    RoundOutcome::Abandoned
                }
            }
        }
        Ok(Ok(_)) => {
            debug!(conversation = %conversation_id, "Seller withdrew before confirming");
            RoundOutcome::Abandoned
        }
        Ok(Err(e)) => {
            warn!(conversation = %conversation_id, error = %e, "Transport fault delivering acceptance");
            RoundOutcome::Abandoned
        }
        Err(_) => {
            debug!(conversation = %conversation_id, "Seller confirmation timed out");
            RoundOutcome::Abandoned
        }
    }
}
