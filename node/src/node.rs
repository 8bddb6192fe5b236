//! Node lifecycle: wiring the context to its collaborators, starting the
//! listener and background tasks, and stopping gracefully.

use braid_network::TcpTransport;
use braid_types::SystemClock;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::{NodeConfig, NoopPeerTable};
use crate::context::{NodeContext, NodeIdentity, NodePorts};
use crate::listener;
use crate::shutdown::ShutdownController;
use crate::snapshot::NodeSnapshot;
use crate::tasks;
use crate::NodeError;

/// Upper bound on waiting for background tasks to finish after shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// How often the departure flush checks whether the outbox has drained.
const FLUSH_POLL: Duration = Duration::from_millis(50);

pub struct BraidNode {
    ctx: Arc<NodeContext>,
    shutdown: ShutdownController,
    task_handles: Vec<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl BraidNode {
    /// A node using the system clock and TCP, with no peer-table sink.
    pub fn new(config: NodeConfig, identity: NodeIdentity) -> Result<Self, NodeError> {
        let ports = NodePorts {
            clock: Arc::new(SystemClock),
            transport: Arc::new(TcpTransport::default()),
            peer_table: Arc::new(NoopPeerTable),
        };
        Self::with_ports(config, identity, ports)
    }

    pub fn with_ports(
        config: NodeConfig,
        identity: NodeIdentity,
        ports: NodePorts,
    ) -> Result<Self, NodeError> {
        let ctx = NodeContext::new(identity, config, ports)?;
        Ok(Self {
            ctx: Arc::new(ctx),
            shutdown: ShutdownController::new(),
            task_handles: Vec::new(),
            local_addr: None,
        })
    }

    pub fn context(&self) -> &Arc<NodeContext> {
        &self.ctx
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn shutdown_controller(&self) -> &ShutdownController {
        &self.shutdown
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        self.ctx.snapshot()
    }

    /// Bind the listener, spawn every background task and request the
    /// initial sync. Returns the bound address.
    pub async fn start(&mut self) -> Result<SocketAddr, NodeError> {
        if self.local_addr.is_some() {
            return Err(NodeError::AlreadyStarted);
        }
        self.ctx.config.validate()?;
        let identity = &self.ctx.identity;
        let bind = format!("{}:{}", identity.address.ip, identity.address.port);
        let tcp = TcpListener::bind(&bind).await?;
        let local_addr = tcp.local_addr()?;
        tracing::info!(
            id = %identity.id,
            %local_addr,
            nat = identity.flags.nat,
            light = identity.flags.light,
            malicious = identity.malicious,
            new_node = identity.new_node,
            "braid node listening"
        );
        self.local_addr = Some(local_addr);

        let ctx = &self.ctx;
        let timing = ctx.config.timing.clone();
        let secs = Duration::from_secs;
        let mut handles = vec![listener::spawn_listener(
            tcp,
            Arc::clone(ctx),
            self.shutdown.subscribe(),
        )];

        for worker in 0..ctx.config.delivery_workers.max(1) {
            handles.push(tasks::spawn_delivery_worker(
                worker,
                Arc::clone(ctx),
                self.shutdown.subscribe(),
            ));
        }

        let periodic: [(&'static str, u64, fn(&NodeContext)); 6] = [
            ("heartbeat", timing.ping_secs, |c| {
                c.heartbeat_round();
            }),
            ("liveness", timing.ping_secs, |c| {
                c.liveness_round();
            }),
            ("cleanup", timing.cleanup_secs, |c| {
                c.cleanup_round();
            }),
            ("inventory", timing.inventory_secs, |c| {
                c.inventory_round();
            }),
            ("sync", timing.sync_secs, |c| {
                c.request_latest_block();
            }),
            ("transactions", timing.tx_secs, |c| {
                c.generate_transaction();
            }),
        ];
        for (name, period, round) in periodic {
            handles.push(tasks::spawn_periodic(
                name,
                secs(period),
                Arc::clone(ctx),
                self.shutdown.subscribe(),
                round,
            ));
        }

        // The first HELLO goes out now and carries the new-node flag.
        ctx.hello_round(true);
        handles.push(tasks::spawn_periodic(
            "hello",
            secs(timing.hello_secs),
            Arc::clone(ctx),
            self.shutdown.subscribe(),
            |c| {
                c.hello_round(false);
            },
        ));

        handles.push(tasks::spawn_block_generator(
            secs(timing.block_secs),
            secs(timing.sync_wait_secs),
            Arc::clone(ctx),
            self.shutdown.subscribe(),
        ));
        handles.push(tasks::spawn_link_fluctuation(
            Arc::clone(ctx),
            self.shutdown.subscribe(),
        ));

        ctx.request_initial_sync();
        self.task_handles = handles;
        Ok(local_addr)
    }

    /// Announce departure, give the delivery workers up to `grace` to flush,
    /// then stop every task.
    pub async fn stop(&mut self, grace: Duration) {
        if self.shutdown.is_triggered() {
            return;
        }
        tracing::info!(id = %self.ctx.id(), "braid node stopping");
        if self.local_addr.is_some() {
            self.ctx.announce_departure("shutdown");
            let flushed = tokio::time::timeout(grace, async {
                while !self.ctx.outbox.lock().is_empty() {
                    tokio::time::sleep(FLUSH_POLL).await;
                }
            })
            .await;
            if flushed.is_err() {
                tracing::warn!(
                    pending = self.ctx.outbox.lock().total_len(),
                    "departure flush timed out"
                );
            }
        }

        self.shutdown.shutdown();
        let handles: Vec<JoinHandle<()>> = self.task_handles.drain(..).collect();
        let wait_all = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, wait_all).await.is_err() {
            tracing::warn!(
                "shutdown timeout ({:?}), some tasks may still be running",
                SHUTDOWN_TIMEOUT
            );
        }
        self.ctx.refresh_gauges();
        tracing::info!(id = %self.ctx.id(), "braid node stopped");
    }
}
