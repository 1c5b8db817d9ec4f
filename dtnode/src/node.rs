// Copyright (C) 2023 Felix Huettner
//
// This file is part of DTRD.
//
// DTRD is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// DTRD is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use actix::Actor;
use bundle::{BundleId, Eid};
use log::info;
use tokio::sync::{broadcast, mpsc};

use crate::common::config::Config;
use crate::delivery_log::DeliveryLog;
use crate::forwarding::{ForwardingAgent, ForwardingConfig, ForwardingHandle};
use crate::hook::ApplicationHook;
use crate::listener::Listener;
use crate::metrics::Metrics;
use crate::neighbor::NeighborTable;
use crate::store::FileStore;
use crate::sweeper::Sweeper;

/// A single running node: the assembled store, neighbor table, transport
/// listener, forwarding engine and sweeper behind one handle. Everything
/// here is reached through explicit fields rather than a process-wide
/// actor registry, so nothing stops two `Node`s from running in the same
/// process — a requirement for running several nodes side by side in a
/// single test binary.
pub struct Node {
    pub eid: Eid,
    pub engine: ForwardingHandle,
    pub metrics: Arc<Metrics>,
    pub store: FileStore,
    listen_addr: SocketAddr,
    notify_shutdown: broadcast::Sender<()>,
    shutdown_complete_tx: mpsc::Sender<()>,
    shutdown_complete_rx: mpsc::Receiver<()>,
}

impl Node {
    /// Assembles and starts every subsystem from `config`, rehydrating
    /// any bundles left over from a previous run before returning. The
    /// application hook and optional delivery log are supplied by the
    /// caller (`main`, an embedding program, or a test) rather than
    /// picked here, so `Node` itself stays agnostic to `node_role`.
    pub async fn start(
        config: Config,
        hook: Arc<dyn ApplicationHook>,
        delivery_log: Option<Arc<DeliveryLog>>,
    ) -> io::Result<Node> {
        let (store, rehydrated) = FileStore::open(config.storage_dir.clone())?;
        let neighbors = NeighborTable::from_entries(config.neighbors.clone());
        let metrics = Arc::new(Metrics::default());

        let forwarding_config = ForwardingConfig {
            max_frame_bytes: config.max_frame_bytes,
            max_forward_workers: config.max_forward_workers,
            connect_timeout: config.connect_timeout,
            write_timeout: config.write_timeout,
            initial_backoff: config.initial_backoff,
            max_backoff: config.max_backoff,
            resend_period: config.resend_period,
        };

        let forwarding_addr = ForwardingAgent::new(
            config.eid.clone(),
            store.clone(),
            neighbors,
            metrics.clone(),
            hook,
            delivery_log,
            forwarding_config,
        )
        .start();
        let engine = ForwardingHandle::new(forwarding_addr);

        for bundle in rehydrated {
            engine.rehydrate(bundle);
        }

        Sweeper::new(store.clone(), metrics.clone(), config.sweeper_period).start();

        let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.listen_port));
        let listener = Listener::bind(bind_addr).await?;
        let listen_addr = listener.local_addr();

        let (notify_shutdown, _) = broadcast::channel(1);
        let (shutdown_complete_tx, shutdown_complete_rx) = mpsc::channel(1);

        let listener_shutdown = notify_shutdown.subscribe();
        let listener_engine = engine.clone();
        let listener_metrics = metrics.clone();
        let listener_shutdown_complete = shutdown_complete_tx.clone();
        let max_frame_bytes = config.max_frame_bytes;
        tokio::spawn(async move {
            listener
                .run(listener_shutdown, listener_engine, listener_metrics, max_frame_bytes)
                .await;
            drop(listener_shutdown_complete);
        });

        info!("node {} up, listening on {listen_addr}", config.eid);

        Ok(Node {
            eid: config.eid,
            engine,
            metrics,
            store,
            listen_addr,
            notify_shutdown,
            shutdown_complete_tx,
            shutdown_complete_rx,
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    pub async fn submit(&self, destination: Eid, payload: Vec<u8>, lifetime: u64) -> BundleId {
        self.engine.submit(destination, payload, lifetime).await
    }

    /// Signals every subsystem to stop and waits for in-flight work to
    /// drain: dropping `notify_shutdown` wakes every subscriber, then this
    /// blocks on the shutdown-complete `mpsc::Receiver` until every cloned
    /// sender has been dropped in turn.
    pub async fn shutdown(mut self) {
        info!("node {} shutting down", self.eid);
        drop(self.notify_shutdown);
        drop(self.shutdown_complete_tx);
        let _ = self.shutdown_complete_rx.recv().await;
    }
}
