use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use booktrade_inventory::InventoryView;
use booktrade_models::{
    Acceptance, Book, CallForProposals, CfpReply, Offer, OfferDecision, ProposalSet,
    TradeConfirmation, TransactionRecord,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::committer::TransactionCommitter;
use crate::error::NegotiationError;
use crate::pricing::{PricingPolicy, TradingClock};
use crate::transport::PeerRequest;

/// Seller side of one call-for-proposals. Answers each CFP exactly once and
/// never re-offers after a rejection.
pub struct Responder {
    peer_name: String,
    inventory: InventoryView,
    pricing: Arc<PricingPolicy>,
    clock: TradingClock,
    proposal_ttl: Duration,
}

/// State remembered between proposing and hearing back the decision.
#[derive(Debug, Clone)]
pub struct PendingSale {
    pub conversation_id: Uuid,
    pub buyer: String,
    pub will_sell: Vec<Book>,
    pub expires_at: DateTime<Utc>,
}

/// Result of evaluating a CFP: either a refusal, or a proposal plus the
/// pending state to recall if the buyer accepts.
pub enum CfpOutcome {
    Refuse { reason: String },
    Propose {
        proposal: ProposalSet,
        pending: PendingSale,
    },
}

impl Responder {
    pub fn new(
        peer_name: String,
        inventory: InventoryView,
        pricing: Arc<PricingPolicy>,
        clock: TradingClock,
        proposal_ttl: Duration,
    ) -> Self {
        Self {
            peer_name,
            inventory,
            pricing,
            clock,
            proposal_ttl,
        }
    }

    /// Evaluate an incoming call-for-proposals.
    ///
    /// The demand gate is all-or-nothing: every requested title must be
    /// sellable (owned, and not an unspared goal title) or the whole CFP is
    /// refused; there are no partial proposals.
    pub fn handle_cfp(&self, cfp: &CallForProposals) -> CfpOutcome {
        let snapshot = self.inventory.snapshot();
        let elapsed = self.clock.elapsed();

        let mut sell_books = Vec::with_capacity(cfp.titles.len());
        for title in &cfp.titles {
            match snapshot.sellable_instance(title) {
                Some(book) => sell_books.push(book.clone()),
                None => {
                    return CfpOutcome::Refuse {
                        reason: format!("cannot part with \"{title}\""),
                    }
                }
            }
        }

        let cash_price: Decimal = sell_books
            .iter()
            .map(|b| self.pricing.sell_price(&b.title, elapsed))
            .sum();

        // One barter offer per own unmet goal: knock our buy price for that
        // goal title off the cash price in exchange for the goal book. The
        // cash offer goes last so a buyer indifferent between equal costs
        // settles on a barter.
        let mut offers: Vec<Offer> = snapshot
            .unmet_goals()
            .map(|goal| Offer {
                money: cash_price - self.pricing.buy_price(&goal.title, elapsed, &snapshot),
                books: vec![Book::wanted(&goal.title)],
            })
            .collect();
        offers.push(Offer::cash(cash_price));

        let expires_at =
            Utc::now() + chrono::Duration::milliseconds(self.proposal_ttl.as_millis() as i64);

        CfpOutcome::Propose {
            proposal: ProposalSet {
                conversation_id: cfp.conversation_id,
                will_sell: Some(sell_books.clone()),
                offers,
                reply_by: expires_at,
            },
            pending: PendingSale {
                conversation_id: cfp.conversation_id,
                buyer: cfp.from.clone(),
                will_sell: sell_books,
                expires_at,
            },
        }
    }

    /// The buyer accepted one of our offers: mirror it into the transaction
    /// we report to the ledger.
    pub fn handle_acceptance(
        &self,
        pending: &PendingSale,
        acceptance: &Acceptance,
    ) -> (TradeConfirmation, TransactionRecord) {
        let record = TransactionRecord {
            sender: self.peer_name.clone(),
            receiver: pending.buyer.clone(),
            conversation_id: pending.conversation_id,
            sending_books: pending.will_sell.clone(),
            sending_money: Decimal::ZERO,
            receiving_books: acceptance.offer.books.clone(),
            receiving_money: acceptance.offer.money,
        };
        (
            TradeConfirmation {
                conversation_id: pending.conversation_id,
            },
            record,
        )
    }
}

/// Per-peer inbound loop: one fully concurrent responder instance per
/// counterpart, with pending proposals tracked by conversation id.
#[derive(Clone)]
pub struct ResponderService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    responder: Responder,
    committer: Arc<TransactionCommitter>,
    pending: Mutex<HashMap<Uuid, PendingSale>>,
}

impl ResponderService {
    pub fn new(responder: Responder, committer: Arc<TransactionCommitter>) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                responder,
                committer,
                pending: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Consume the inbox until cancelled. Every request is handled on its own
    /// task; nothing here blocks on a slow counterpart.
    pub async fn run(self, mut inbox: mpsc::Receiver<PeerRequest>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(peer = %self.inner.responder.peer_name, "Responder service shutting down");
                    break;
                }
                request = inbox.recv() => match request {
                    Some(request) => {
                        let inner = Arc::clone(&self.inner);
                        tokio::spawn(async move { inner.handle(request).await });
                    }
                    None => break,
                }
            }
        }
    }
}

impl ServiceInner {
    async fn handle(&self, request: PeerRequest) {
        match request {
            PeerRequest::Cfp { cfp, reply } => self.handle_cfp(cfp, reply),
            PeerRequest::Decision { decision, reply } => {
                self.handle_decision(decision, reply).await
            }
        }
    }

    fn handle_cfp(&self, cfp: CallForProposals, reply: tokio::sync::oneshot::Sender<CfpReply>) {
        let answer = match self.responder.handle_cfp(&cfp) {
            CfpOutcome::Refuse { reason } => {
                debug!(
                    peer = %self.responder.peer_name,
                    buyer = %cfp.from,
                    conversation = %cfp.conversation_id,
                    %reason,
                    "Refusing call-for-proposals"
                );
                CfpReply::Refuse { reason }
            }
            CfpOutcome::Propose { proposal, pending } => {
                debug!(
                    peer = %self.responder.peer_name,
                    buyer = %cfp.from,
                    conversation = %cfp.conversation_id,
                    offers = proposal.offers.len(),
                    "Proposing"
                );
                self.store_pending(pending);
                CfpReply::Propose(proposal)
            }
        };
        if reply.send(answer).is_err() {
            debug!(conversation = %cfp.conversation_id, "Buyer went away before our reply");
        }
    }

    async fn handle_decision(
        &self,
        decision: OfferDecision,
        reply: tokio::sync::oneshot::Sender<Option<TradeConfirmation>>,
    ) {
        let conversation_id = decision.conversation_id();
        match decision {
            OfferDecision::Reject { .. } => {
                self.take_pending(conversation_id).ok();
                let _ = reply.send(None);
            }
            OfferDecision::Accept(acceptance) => {
                let pending = match self.take_pending(conversation_id) {
                    Ok(pending) => pending,
                    Err(e) => {
                        // A round we already gave up on; the acceptance is
                        // ignored on arrival.
                        warn!(error = %e, "Ignoring acceptance");
                        let _ = reply.send(None);
                        return;
                    }
                };

                let (confirmation, record) =
                    self.responder.handle_acceptance(&pending, &acceptance);
                info!(
                    peer = %self.responder.peer_name,
                    buyer = %pending.buyer,
                    conversation = %conversation_id,
                    money = %acceptance.offer.money,
                    "Offer accepted, committing sale"
                );

                // Confirm first, then report our half to the ledger; the
                // ledger remains the arbiter of whether the trade sticks.
                let _ = reply.send(Some(confirmation));
                if let Err(e) = self.committer.submit(record).await {
                    warn!(
                        conversation = %conversation_id,
                        error = %e,
                        "Sale did not commit"
                    );
                }
            }
        }
    }

    fn store_pending(&self, pending: PendingSale) {
        let mut map = lock_unpoisoned(&self.pending);
        let now = Utc::now();
        map.retain(|_, p| p.expires_at > now);
        map.insert(pending.conversation_id, pending);
    }

    fn take_pending(&self, conversation_id: Uuid) -> Result<PendingSale, NegotiationError> {
        let mut map = lock_unpoisoned(&self.pending);
        match map.remove(&conversation_id) {
            Some(pending) if pending.expires_at > Utc::now() => Ok(pending),
            _ => Err(NegotiationError::StaleAcceptance(conversation_id)),
        }
    }
}

fn lock_unpoisoned<'a, T>(mutex: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
