use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::initiator::{run_round, InitiatorContext};

/// Periodically launches one buyer round per unmet goal.
///
/// Rounds are independent tasks: a slow round for one goal neither blocks
/// other goals nor the next tick for the same goal. A round that outlives
/// its deadlines ends itself; the scheduler never waits on it.
pub struct Scheduler {
    ctx: Arc<InitiatorContext>,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(ctx: Arc<InitiatorContext>, cancel: CancellationToken) -> Self {
        Self { ctx, cancel }
    }

    pub async fn run(self) {
        let tick = self.ctx.config.tick_interval();
        let mut rounds: JoinSet<()> = JoinSet::new();

        info!(peer = %self.ctx.peer_name, tick_ms = tick.as_millis() as u64, "Scheduler started");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!(peer = %self.ctx.peer_name, "Scheduler shutting down");
                    break;
                }
                _ = tokio::time::sleep(tick) => {
                    // Reap rounds that already finished; their outcome was
                    // logged where it happened.
                    while rounds.try_join_next().is_some() {}

                    let snapshot = self.ctx.inventory.snapshot();
                    for goal in snapshot.unmet_goals() {
                        let ctx = Arc::clone(&self.ctx);
                        let goal = goal.clone();
                        rounds.spawn(async move {
                            let outcome = run_round(&ctx, &goal).await;
                            debug!(
                                peer = %ctx.peer_name,
                                goal = %goal.title,
                                ?outcome,
                                "Round finished"
                            );
                        });
                    }
                }
            }
        }

        // In-flight rounds are abandoned on shutdown, not drained.
        rounds.shutdown().await;
    }
}
