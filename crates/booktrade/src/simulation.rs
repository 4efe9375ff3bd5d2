//! A self-contained local marketplace: a set of peers with random
//! endowments trading over in-process transport against one shared ledger.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use booktrade_engine::test_support::{ChannelTransport, InMemoryDirectory, InMemoryLedger};
use booktrade_engine::{Directory, NegotiationError, PeerHandle, TradingPeer, Transport};
use booktrade_models::{Book, Catalog, Goal, PeerConfig, BOOK_TRADER_SERVICE};

#[derive(Debug, Clone)]
pub struct SimulationSettings {
    pub peers: usize,
    pub books_per_peer: usize,
    pub goals_per_peer: usize,
    pub starting_money: Decimal,
    /// Seed for reproducible endowments; entropy-seeded when absent.
    pub seed: Option<u64>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            peers: 3,
            books_per_peer: 3,
            goals_per_peer: 2,
            starting_money: Decimal::from(100),
            seed: None,
        }
    }
}

/// Final account state of one peer, reported when the session ends.
#[derive(Debug, Serialize)]
pub struct PeerSummary {
    pub name: String,
    pub money: Decimal,
    pub books: Vec<String>,
    pub goals_met: usize,
    pub goals_total: usize,
}

/// A running session of trading peers sharing one ledger.
pub struct Simulation {
    ledger: Arc<InMemoryLedger>,
    names: Vec<String>,
    handles: Vec<PeerHandle>,
}

impl Simulation {
    /// Seed the ledger with random endowments and start every peer.
    pub async fn start(
        config: &PeerConfig,
        settings: &SimulationSettings,
    ) -> Result<Self, NegotiationError> {
        let catalog = Arc::new(config.catalog.build());
        let ledger = Arc::new(InMemoryLedger::new());
        let directory = Arc::new(InMemoryDirectory::new());
        let transport = Arc::new(ChannelTransport::new());
        let mut rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let names: Vec<String> = (1..=settings.peers).map(|i| format!("peer-{i}")).collect();
        for name in &names {
            let (books, goals) = endow(&mut rng, &catalog, settings);
            info!(
                peer = %name,
                books = books.len(),
                goals = goals.len(),
                money = %settings.starting_money,
                "Endowed"
            );
            ledger.seed_account(name, books, goals, settings.starting_money);
            directory.register(BOOK_TRADER_SERVICE, name);
        }

        let mut handles = Vec::with_capacity(names.len());
        for name in &names {
            let inbox = transport.register(name);
            let handle = TradingPeer::start(
                name.clone(),
                config.trading.clone(),
                Arc::clone(&catalog),
                Arc::clone(&directory) as Arc<dyn Directory>,
                Arc::clone(&transport) as Arc<dyn Transport>,
                ledger.client_for(name),
                inbox,
            )
            .await?;
            handles.push(handle);
        }

        Ok(Self {
            ledger,
            names,
            handles,
        })
    }

    /// Current ledger-side account state of every peer.
    pub fn summaries(&self) -> Vec<PeerSummary> {
        self.names
            .iter()
            .filter_map(|name| {
                let account = self.ledger.account(name)?;
                let goals_met = account
                    .goals
                    .iter()
                    .filter(|g| account.books.iter().any(|b| b.title == g.title))
                    .count();
                Some(PeerSummary {
                    name: name.clone(),
                    money: account.money,
                    books: account.books.iter().map(|b| b.title.clone()).collect(),
                    goals_met,
                    goals_total: account.goals.len(),
                })
            })
            .collect()
    }

    pub async fn shutdown(self) {
        for handle in self.handles {
            handle.shutdown().await;
        }
    }
}

/// Random endowment: distinct owned titles, and goals drawn from the titles
/// the peer does not start with so every goal takes a trade to meet.
fn endow(
    rng: &mut StdRng,
    catalog: &Catalog,
    settings: &SimulationSettings,
) -> (Vec<Book>, Vec<Goal>) {
    let mut titles: Vec<&str> = catalog.titles().collect();
    titles.shuffle(rng);

    let books = titles
        .iter()
        .take(settings.books_per_peer)
        .map(|t| Book::owned(t))
        .collect();
    let goals = titles
        .iter()
        .skip(settings.books_per_peer)
        .take(settings.goals_per_peer)
        .map(|t| Goal::new(t, Decimal::from(rng.gen_range(60..=150))))
        .collect();
    (books, goals)
}
