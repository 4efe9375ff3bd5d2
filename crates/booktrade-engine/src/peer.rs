use std::sync::Arc;

use booktrade_inventory::{InventorySnapshot, InventoryView, LedgerClient};
use booktrade_models::{Catalog, TradingConfig};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::committer::TransactionCommitter;
use crate::error::NegotiationError;
use crate::initiator::InitiatorContext;
use crate::pricing::{PricingPolicy, TradingClock};
use crate::responder::{Responder, ResponderService};
use crate::scheduler::Scheduler;
use crate::transport::{Directory, PeerRequest, Transport};

/// One assembled trading peer: inventory, pricing, a responder service on
/// the inbound side and a scheduler driving buyer rounds on the outbound
/// side, all sharing one committer.
pub struct TradingPeer;

/// Running peer; cancel it to stop trading.
pub struct PeerHandle {
    pub name: String,
    cancel: CancellationToken,
    tasks: JoinSet<()>,
}

impl PeerHandle {
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        while self.tasks.join_next().await.is_some() {}
    }
}

impl TradingPeer {
    /// Query the ledger for the session-start inventory, then start the
    /// responder service and the scheduler.
    #[allow(clippy::too_many_arguments)]
    pub async fn start(
        name: String,
        config: TradingConfig,
        catalog: Arc<Catalog>,
        directory: Arc<dyn Directory>,
        transport: Arc<dyn Transport>,
        ledger: Arc<dyn LedgerClient>,
        inbox: mpsc::Receiver<PeerRequest>,
    ) -> Result<PeerHandle, NegotiationError> {
        let info = tokio::time::timeout(config.ledger_timeout(), ledger.get_my_info())
            .await
            .map_err(|_| NegotiationError::CommitTimeout(config.ledger_timeout_ms))??;

        info!(
            peer = %name,
            books = info.books.len(),
            goals = info.goals.len(),
            money = %info.money,
            "Peer starting"
        );

        let inventory = InventoryView::new(InventorySnapshot::from(info));
        let clock = TradingClock::start();
        let pricing = Arc::new(PricingPolicy::new(catalog, &config));
        let committer = Arc::new(TransactionCommitter::new(
            Arc::clone(&ledger),
            inventory.clone(),
            config.ledger_timeout(),
        ));

        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();

        let responder = Responder::new(
            name.clone(),
            inventory.clone(),
            Arc::clone(&pricing),
            clock,
            config.cfp_timeout(),
        );
        let service = ResponderService::new(responder, Arc::clone(&committer));
        tasks.spawn(service.run(inbox, cancel.clone()));

        let ctx = Arc::new(InitiatorContext {
            peer_name: name.clone(),
            inventory,
            pricing,
            clock,
            directory,
            transport,
            committer,
            config,
        });
        tasks.spawn(Scheduler::new(ctx, cancel.clone()).run());

        Ok(PeerHandle {
            name,
            cancel,
            tasks,
        })
    }
}
