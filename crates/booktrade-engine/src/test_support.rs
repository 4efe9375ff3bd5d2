//! In-memory marketplace collaborators: an authoritative ledger, a
//! directory and a channel-backed transport.
//!
//! These stand in for the external services the engine is specified
//! against, so integration tests and the local simulation binary run fully
//! in-process. The ledger reproduces the arbiter semantics the engine
//! relies on: both counterparties submit mirrored records under one
//! conversation id, the first submission settles the trade atomically and
//! the second only learns the stored outcome.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use uuid::Uuid;

use booktrade_inventory::{LedgerClient, LedgerError};
use booktrade_models::{
    Book, CallForProposals, CfpReply, Goal, OfferDecision, PeerInfo, TradeConfirmation,
    TransactionRecord,
};
use rust_decimal::Decimal;

use crate::transport::{Directory, PeerRequest, Transport, TransportError};

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[derive(Default)]
struct LedgerState {
    accounts: HashMap<String, PeerInfo>,
    // Outcome per conversation id; a mirrored re-submission gets the stored
    // verdict instead of a second settlement.
    settled: HashMap<Uuid, Result<(), String>>,
}

/// Authoritative inventory/money/goal state for a whole marketplace.
#[derive(Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_account(&self, name: &str, books: Vec<Book>, goals: Vec<Goal>, money: Decimal) {
        let mut state = lock_unpoisoned(&self.state);
        state.accounts.insert(
            name.to_string(),
            PeerInfo {
                books,
                goals,
                money,
            },
        );
    }

    pub fn account(&self, name: &str) -> Option<PeerInfo> {
        lock_unpoisoned(&self.state).accounts.get(name).cloned()
    }

    /// Number of conversations the ledger actually honored.
    pub fn honored_count(&self) -> usize {
        lock_unpoisoned(&self.state)
            .settled
            .values()
            .filter(|outcome| outcome.is_ok())
            .count()
    }

    /// A ledger client bound to one peer's identity.
    pub fn client_for(self: &Arc<Self>, peer: &str) -> Arc<dyn LedgerClient> {
        Arc::new(PeerLedgerClient {
            ledger: Arc::clone(self),
            peer: peer.to_string(),
        })
    }

    fn apply(&self, record: &TransactionRecord) -> Result<TradeConfirmation, LedgerError> {
        let mut state = lock_unpoisoned(&self.state);

        if let Some(prior) = state.settled.get(&record.conversation_id) {
            return match prior {
                Ok(()) => Ok(TradeConfirmation {
                    conversation_id: record.conversation_id,
                }),
                Err(reason) => Err(LedgerError::Rejected(reason.clone())),
            };
        }

        let outcome = settle(&mut state.accounts, record);
        state.settled.insert(
            record.conversation_id,
            outcome.as_ref().map(|_| ()).map_err(|e| e.to_string()),
        );
        outcome.map(|()| TradeConfirmation {
            conversation_id: record.conversation_id,
        })
    }
}

/// Validate and apply both directions of a trade atomically.
fn settle(
    accounts: &mut HashMap<String, PeerInfo>,
    record: &TransactionRecord,
) -> Result<(), LedgerError> {
    let mut sender = accounts
        .get(&record.sender)
        .cloned()
        .ok_or_else(|| LedgerError::UnknownPeer(record.sender.clone()))?;
    let mut receiver = accounts
        .get(&record.receiver)
        .cloned()
        .ok_or_else(|| LedgerError::UnknownPeer(record.receiver.clone()))?;

    for book in &record.sending_books {
        let moved = take_copy(&mut sender.books, book).ok_or_else(|| {
            LedgerError::Rejected(format!("{} does not hold \"{}\"", record.sender, book.title))
        })?;
        receiver.books.push(moved);
    }
    for book in &record.receiving_books {
        let moved = take_copy(&mut receiver.books, book).ok_or_else(|| {
            LedgerError::Rejected(format!(
                "{} does not hold \"{}\"",
                record.receiver, book.title
            ))
        })?;
        sender.books.push(moved);
    }

    sender.money = sender.money - record.sending_money + record.receiving_money;
    receiver.money = receiver.money + record.sending_money - record.receiving_money;
    if sender.money < Decimal::ZERO || receiver.money < Decimal::ZERO {
        return Err(LedgerError::Rejected("insufficient funds".to_string()));
    }

    accounts.insert(record.sender.clone(), sender);
    accounts.insert(record.receiver.clone(), receiver);
    Ok(())
}

/// Remove one matching copy: by instance id when given, else by title.
fn take_copy(books: &mut Vec<Book>, wanted: &Book) -> Option<Book> {
    let idx = books.iter().position(|b| match wanted.instance {
        Some(id) => b.instance == Some(id),
        None => b.title == wanted.title,
    })?;
    Some(books.remove(idx))
}

struct PeerLedgerClient {
    ledger: Arc<InMemoryLedger>,
    peer: String,
}

#[async_trait]
impl LedgerClient for PeerLedgerClient {
    async fn get_my_info(&self) -> Result<PeerInfo, LedgerError> {
        self.ledger
            .account(&self.peer)
            .ok_or_else(|| LedgerError::UnknownPeer(self.peer.clone()))
    }

    async fn make_transaction(
        &self,
        record: &TransactionRecord,
    ) -> Result<TradeConfirmation, LedgerError> {
        self.ledger.apply(record)
    }
}

/// Directory with explicit registrations per service type.
#[derive(Default)]
pub struct InMemoryDirectory {
    services: Mutex<HashMap<String, Vec<String>>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, service_type: &str, peer: &str) {
        lock_unpoisoned(&self.services)
            .entry(service_type.to_string())
            .or_default()
            .push(peer.to_string());
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn find_peers(&self, service_type: &str) -> Result<Vec<String>, TransportError> {
        Ok(lock_unpoisoned(&self.services)
            .get(service_type)
            .cloned()
            .unwrap_or_default())
    }
}

/// Transport backed by per-peer mpsc inboxes. Messages are pushed through a
/// JSON round trip so the wire codec path is exercised even in-process.
#[derive(Default)]
pub struct ChannelTransport {
    inboxes: Mutex<HashMap<String, mpsc::Sender<PeerRequest>>>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the inbox for a peer; hand the receiver to its responder
    /// service.
    pub fn register(&self, peer: &str) -> mpsc::Receiver<PeerRequest> {
        let (tx, rx) = mpsc::channel(32);
        lock_unpoisoned(&self.inboxes).insert(peer.to_string(), tx);
        rx
    }

    fn sender_for(&self, peer: &str) -> Result<mpsc::Sender<PeerRequest>, TransportError> {
        lock_unpoisoned(&self.inboxes)
            .get(peer)
            .cloned()
            .ok_or_else(|| TransportError::Unreachable(peer.to_string()))
    }
}

fn reencode<T: Serialize + DeserializeOwned>(value: &T) -> Result<T, TransportError> {
    let encoded = serde_json::to_string(value).map_err(|e| TransportError::Codec(e.to_string()))?;
    serde_json::from_str(&encoded).map_err(|e| TransportError::Codec(e.to_string()))
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn request_proposals(
        &self,
        peer: &str,
        cfp: CallForProposals,
    ) -> Result<CfpReply, TransportError> {
        let cfp = reencode(&cfp)?;
        let sender = self.sender_for(peer)?;
        let (tx, rx) = oneshot::channel();
        sender
            .send(PeerRequest::Cfp { cfp, reply: tx })
            .await
            .map_err(|_| TransportError::Unreachable(peer.to_string()))?;
        let reply = rx
            .await
            .map_err(|_| TransportError::NoReply(peer.to_string()))?;
        reencode(&reply)
    }

    async fn send_decision(
        &self,
        peer: &str,
        decision: OfferDecision,
    ) -> Result<Option<TradeConfirmation>, TransportError> {
        let decision = reencode(&decision)?;
        debug!(%peer, conversation = %decision.conversation_id(), "Delivering decision");
        let sender = self.sender_for(peer)?;
        let (tx, rx) = oneshot::channel();
        sender
            .send(PeerRequest::Decision {
                decision,
                reply: tx,
            })
            .await
            .map_err(|_| TransportError::Unreachable(peer.to_string()))?;
        let reply = rx
            .await
            .map_err(|_| TransportError::NoReply(peer.to_string()))?;
        reencode(&reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn ledger_settles_a_bilateral_trade_once() {
        let ledger = InMemoryLedger::new();
        let copy = Book::owned("Dune");
        ledger.seed_account("seller", vec![copy.clone()], vec![], dec!(0));
        ledger.seed_account("buyer", vec![], vec![], dec!(50));

        let record = TransactionRecord {
            sender: "seller".to_string(),
            receiver: "buyer".to_string(),
            conversation_id: Uuid::new_v4(),
            sending_books: vec![copy],
            sending_money: Decimal::ZERO,
            receiving_books: vec![],
            receiving_money: dec!(39),
        };

        ledger.apply(&record).unwrap();
        // The buyer's mirrored half confirms without settling twice.
        ledger.apply(&record.mirrored()).unwrap();

        let seller = ledger.account("seller").unwrap();
        let buyer = ledger.account("buyer").unwrap();
        assert_eq!(seller.money, dec!(39));
        assert_eq!(buyer.money, dec!(11));
        assert!(seller.books.is_empty());
        assert_eq!(buyer.books.len(), 1);
        assert_eq!(ledger.honored_count(), 1);
    }

    #[test]
    fn ledger_rejects_missing_books_and_remembers_the_verdict() {
        let ledger = InMemoryLedger::new();
        ledger.seed_account("seller", vec![], vec![], dec!(0));
        ledger.seed_account("buyer", vec![], vec![], dec!(50));

        let record = TransactionRecord {
            sender: "seller".to_string(),
            receiver: "buyer".to_string(),
            conversation_id: Uuid::new_v4(),
            sending_books: vec![Book::owned("Dune")],
            sending_money: Decimal::ZERO,
            receiving_books: vec![],
            receiving_money: dec!(39),
        };

        assert!(ledger.apply(&record).is_err());
        assert!(ledger.apply(&record.mirrored()).is_err());
        assert_eq!(ledger.account("buyer").unwrap().money, dec!(50));
        assert_eq!(ledger.honored_count(), 0);
    }

    #[test]
    fn ledger_rejects_overdraft() {
        let ledger = InMemoryLedger::new();
        let copy = Book::owned("Dune");
        ledger.seed_account("seller", vec![copy.clone()], vec![], dec!(0));
        ledger.seed_account("buyer", vec![], vec![], dec!(10));

        let record = TransactionRecord {
            sender: "buyer".to_string(),
            receiver: "seller".to_string(),
            conversation_id: Uuid::new_v4(),
            sending_books: vec![],
            sending_money: dec!(39),
            receiving_books: vec![copy],
            receiving_money: Decimal::ZERO,
        };

        assert!(ledger.apply(&record).is_err());
        // Nothing moved.
        assert_eq!(ledger.account("seller").unwrap().books.len(), 1);
    }

    #[tokio::test]
    async fn directory_returns_registered_peers() {
        let directory = InMemoryDirectory::new();
        directory.register("book-trader", "alice");
        directory.register("book-trader", "bob");

        let peers = directory.find_peers("book-trader").await.unwrap();
        assert_eq!(peers, vec!["alice".to_string(), "bob".to_string()]);
        assert!(directory.find_peers("environment").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn transport_fails_for_unknown_peer() {
        let transport = ChannelTransport::new();
        let cfp = CallForProposals {
            conversation_id: Uuid::new_v4(),
            from: "alice".to_string(),
            titles: vec!["Dune".to_string()],
            reply_by: chrono::Utc::now(),
        };
        let result = transport.request_proposals("nobody", cfp).await;
        assert!(matches!(result, Err(TransportError::Unreachable(_))));
    }
}
