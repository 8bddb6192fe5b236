//! Background task loops. Each runs until the shutdown broadcast fires.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::context::NodeContext;
use crate::outbound::DeliveryOutcome;

/// How long an idle delivery worker waits before polling again, so retries
/// whose back-off has elapsed are picked up without a new enqueue.
const WORKER_IDLE_POLL: Duration = Duration::from_millis(50);

/// How often block generation checks whether sync has produced a chain.
const CHAIN_START_POLL: Duration = Duration::from_secs(1);

/// Run `round` every `period`, starting one period from now.
pub fn spawn_periodic<F>(
    name: &'static str,
    period: Duration,
    ctx: Arc<NodeContext>,
    mut shutdown_rx: broadcast::Receiver<()>,
    mut round: F,
) -> JoinHandle<()>
where
    F: FnMut(&NodeContext) + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    tracing::debug!(task = name, "task shutting down");
                    break;
                }
                _ = interval.tick() => round(&ctx),
            }
        }
    })
}

/// Drain the outbox. Several workers share the outbox's rotation, so fairness
/// across destinations does not depend on the worker count.
pub fn spawn_delivery_worker(
    worker: usize,
    ctx: Arc<NodeContext>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let outcome = tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                outcome = ctx.deliver_next() => outcome,
            };
            if outcome != DeliveryOutcome::Idle {
                continue;
            }
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                _ = ctx.outbox_ready.notified() => {}
                _ = tokio::time::sleep(WORKER_IDLE_POLL) => {}
            }
        }
        tracing::debug!(worker, "delivery worker shutting down");
    })
}

/// Generate blocks every `period`. Before the first block, wait until sync has
/// produced a chain or `sync_wait` has passed, so a joining node does not
/// start a competing genesis.
pub fn spawn_block_generator(
    period: Duration,
    sync_wait: Duration,
    ctx: Arc<NodeContext>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let deadline = Instant::now() + sync_wait;
        while !ctx.chain_started() && Instant::now() < deadline {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => return,
                _ = tokio::time::sleep(CHAIN_START_POLL) => {}
            }
        }

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                _ = interval.tick() => {
                    if let Err(e) = ctx.generate_block() {
                        tracing::error!(error = %e, "block generation failed");
                    }
                }
            }
        }
    })
}

/// Change the link capacity at random intervals.
pub fn spawn_link_fluctuation(
    ctx: Arc<NodeContext>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut delay = ctx.link.lock().next_adjustment();
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                _ = tokio::time::sleep(delay) => {
                    delay = ctx.fluctuate_link();
                }
            }
        }
    })
}
