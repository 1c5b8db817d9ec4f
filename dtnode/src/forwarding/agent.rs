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

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use actix::prelude::*;
use bundle::{Bundle, BundleId, Eid};
use bytes::Bytes;
use log::{error, info, warn};
use rand::Rng;
use tokio::sync::Semaphore;

use crate::delivery_log::DeliveryLog;
use crate::hook::{ApplicationHook, DeliveryRecord};
use crate::metrics::Metrics;
use crate::neighbor::NeighborTable;
use crate::store::{FileStore, PutOutcome};

use super::messages::{ForwardError, ForwardResult, OnReceived, RetryTick, Submit};

/// Tunables the engine needs beyond what [`NeighborTable`]/[`FileStore`]
/// already carry — lifted straight out of [`crate::common::config::Config`]
/// by [`crate::node::Node::start`].
#[derive(Debug, Clone)]
pub struct ForwardingConfig {
    pub max_frame_bytes: usize,
    pub max_forward_workers: usize,
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub resend_period: Duration,
}

/// The dispatch and retry core of a node: addressed via an explicit
/// `Addr<ForwardingAgent>` held by the owning [`crate::node::Node`] rather
/// than a process-wide actor registry, so more than one of these can run
/// in a single process.
pub struct ForwardingAgent {
    local_eid: Eid,
    store: FileStore,
    neighbors: NeighborTable,
    metrics: Arc<Metrics>,
    hook: Arc<dyn ApplicationHook>,
    delivery_log: Option<Arc<DeliveryLog>>,
    config: ForwardingConfig,
    semaphore: Arc<Semaphore>,
    in_flight: HashSet<BundleId>,
    attempts: HashMap<BundleId, u32>,
    self_addr: Option<Addr<ForwardingAgent>>,
}

impl ForwardingAgent {
    pub fn new(
        local_eid: Eid,
        store: FileStore,
        neighbors: NeighborTable,
        metrics: Arc<Metrics>,
        hook: Arc<dyn ApplicationHook>,
        delivery_log: Option<Arc<DeliveryLog>>,
        config: ForwardingConfig,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_forward_workers.max(1)));
        ForwardingAgent {
            local_eid,
            store,
            neighbors,
            metrics,
            hook,
            delivery_log,
            config,
            semaphore,
            in_flight: HashSet::new(),
            attempts: HashMap::new(),
            self_addr: None,
        }
    }

    fn dispatch(&mut self, bundle: Bundle) {
        if bundle.destination == self.local_eid {
            self.deliver_locally(&bundle);
        } else {
            self.schedule_forward(bundle);
        }
    }

    fn deliver_locally(&self, bundle: &Bundle) {
        Metrics::inc(&self.metrics.bundles_delivered);
        let delivered_at = now();
        let record = DeliveryRecord {
            bundle_id: bundle.id,
            source: bundle.source.clone(),
            destination: bundle.destination.clone(),
            payload: bundle.payload.clone(),
            hop_count: bundle.hop_count,
            created_at: bundle.created_at,
            delivered_at,
            e2e_delay: delivered_at - bundle.created_at,
        };
        self.hook.on_delivered(&record);
        if let Some(log) = &self.delivery_log {
            if let Err(e) = log.append(&record) {
                error!("failed to append delivery record for {}: {e}", bundle.id);
            }
        }
        // The bundle stays in the store until it expires: it's the
        // dedup shield against a duplicate of this same delivery
        // arriving again later.
    }

    fn schedule_forward(&mut self, bundle: Bundle) {
        if !self.in_flight.insert(bundle.id) {
            return;
        }
        self.spawn_attempt(bundle);
    }

    fn spawn_attempt(&self, bundle: Bundle) {
        let Some(next_hop) = self.neighbors.single_next_hop() else {
            warn!("no neighbor configured, cannot forward bundle {}", bundle.id);
            if let Some(addr) = &self.self_addr {
                addr.do_send(ForwardResult {
                    id: bundle.id,
                    outcome: Err(ForwardError::NoNeighbor),
                });
            }
            return;
        };

        let forwarded = bundle.forwarded_via(&self.local_eid);
        let frame = Bytes::from(forwarded.encode());
        let store = self.store.clone();
        let semaphore = self.semaphore.clone();
        let max_frame_bytes = self.config.max_frame_bytes;
        let connect_timeout = self.config.connect_timeout;
        let write_timeout = self.config.write_timeout;
        let self_addr = self
            .self_addr
            .clone()
            .expect("ForwardingAgent::started runs before any forward attempt");
        let id = bundle.id;

        tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
            let outcome =
                transport::send_frame(next_hop, frame, max_frame_bytes, connect_timeout, write_timeout)
                    .await
                    .map_err(ForwardError::from);
            if outcome.is_ok() {
                if let Err(e) = store.replace_async(forwarded).await {
                    error!("failed to persist forward image of {id}: {e}");
                }
            }
            self_addr.do_send(ForwardResult { id, outcome });
        });
    }

    /// `2^attempt * initial_backoff`, capped at `max_backoff`, widened by
    /// up to ±20% jitter so a cohort of bundles retrying together doesn't
    /// hammer the same neighbor in lockstep.
    fn next_backoff(&mut self, id: BundleId) -> Duration {
        let attempt = self.attempts.entry(id).or_insert(0);
        let exp = 1u32.checked_shl(*attempt).unwrap_or(u32::MAX);
        *attempt = attempt.saturating_add(1);

        let base = self.config.initial_backoff.saturating_mul(exp).min(self.config.max_backoff);
        let jitter_frac = rand::thread_rng().gen_range(-0.2..=0.2);
        let millis = (base.as_millis() as f64 * (1.0 + jitter_frac)).max(0.0);
        Duration::from_millis(millis as u64)
    }
}

impl Actor for ForwardingAgent {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.self_addr = Some(ctx.address());
        let period = self.config.resend_period;
        ctx.run_interval(period, |_, ctx| {
            ctx.notify(RetryTick);
        });
    }
}

impl Handler<Submit> for ForwardingAgent {
    type Result = ();

    fn handle(&mut self, msg: Submit, _ctx: &mut Context<Self>) -> Self::Result {
        let bundle = Bundle::new(self.local_eid.clone(), msg.destination, msg.payload, now(), msg.lifetime);
        let id = bundle.id;
        match self.store.put(&bundle) {
            Ok(_) => Metrics::inc(&self.metrics.bundles_stored),
            Err(e) => {
                error!("failed to store submitted bundle {id}: {e}");
                Metrics::inc(&self.metrics.store_errors);
            }
        }
        Metrics::inc(&self.metrics.bundles_sent);
        let _ = msg.responder.send(id);
        self.dispatch(bundle);
    }
}

impl Handler<OnReceived> for ForwardingAgent {
    type Result = ();

    /// Expiry check, duplicate check against the store, durable store,
    /// then the local-delivery-or-forward-enqueue branch.
    fn handle(&mut self, msg: OnReceived, _ctx: &mut Context<Self>) -> Self::Result {
        let OnReceived { bundle, from_store } = msg;

        if !from_store {
            Metrics::inc(&self.metrics.bundles_received);
        }

        if bundle.is_expired(now()) {
            Metrics::inc(&self.metrics.bundles_expired);
            self.store.delete(&bundle.id);
            return;
        }

        if from_store {
            // Already on disk from a previous run; re-enter dispatch
            // without touching the store or duplicate counters.
            self.dispatch(bundle);
            return;
        }

        match self.store.put(&bundle) {
            Ok(PutOutcome::AlreadyPresent) => {
                Metrics::inc(&self.metrics.bundles_duplicate);
                return;
            }
            Ok(PutOutcome::Stored) => {
                Metrics::inc(&self.metrics.bundles_stored);
            }
            Err(e) => {
                error!("failed to store received bundle {}: {e}", bundle.id);
                Metrics::inc(&self.metrics.store_errors);
                return;
            }
        }

        self.dispatch(bundle);
    }
}

impl Handler<RetryTick> for ForwardingAgent {
    type Result = ();

    fn handle(&mut self, _msg: RetryTick, _ctx: &mut Context<Self>) -> Self::Result {
        let bundles = match self.store.iter() {
            Ok(bundles) => bundles,
            Err(e) => {
                error!("retry sweep failed to read store: {e}");
                Metrics::inc(&self.metrics.store_errors);
                return;
            }
        };
        let now = now();
        for bundle in bundles {
            if bundle.destination == self.local_eid || bundle.is_expired(now) {
                continue;
            }
            if self.in_flight.contains(&bundle.id) {
                continue;
            }
            // A stored image that already carries our own hop has been
            // forwarded successfully; it stays in the store only as a
            // dedup shield and must not be resent.
            if bundle.path.contains(&self.local_eid) {
                continue;
            }
            self.schedule_forward(bundle);
        }
    }
}

impl Handler<ForwardResult> for ForwardingAgent {
    type Result = ();

    fn handle(&mut self, msg: ForwardResult, ctx: &mut Context<Self>) -> Self::Result {
        self.in_flight.remove(&msg.id);

        match msg.outcome {
            Ok(()) => {
                Metrics::inc(&self.metrics.bundles_forwarded);
                self.attempts.remove(&msg.id);
                // Retained, not deleted: the stored forward-image (which
                // now carries our hop) is what lets a later duplicate of
                // this same bundle be recognized instead of re-forwarded.
                // The sweeper reclaims it once it expires.
            }
            Err(e) => {
                Metrics::inc(&self.metrics.transport_errors);
                warn!("forward attempt for {} failed: {e}", msg.id);
                let delay = self.next_backoff(msg.id);
                let id = msg.id;
                let store = self.store.clone();
                let addr = ctx.address();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Ok(Some(bundle)) = store.get_async(id).await {
                        addr.do_send(OnReceived {
                            bundle,
                            from_store: true,
                        });
                    }
                });
            }
        }
    }
}

fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::LoggingHook;
    use bundle::Eid as BundleEid;
    use std::net::SocketAddr;

    fn config() -> ForwardingConfig {
        ForwardingConfig {
            max_frame_bytes: 1 << 20,
            max_forward_workers: 4,
            connect_timeout: Duration::from_secs(1),
            write_timeout: Duration::from_secs(1),
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(100),
            resend_period: Duration::from_secs(3600),
        }
    }

    #[actix_rt::test]
    async fn submit_to_self_delivers_locally_and_retains_the_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = FileStore::open(dir.path()).unwrap();
        let metrics = Arc::new(Metrics::default());
        let addr = ForwardingAgent::new(
            BundleEid::from("dtn://me"),
            store.clone(),
            NeighborTable::new(),
            metrics.clone(),
            Arc::new(LoggingHook),
            None,
            config(),
        )
        .start();

        let (tx, rx) = tokio::sync::oneshot::channel();
        addr.send(Submit {
            destination: BundleEid::from("dtn://me"),
            payload: b"hi".to_vec(),
            lifetime: 60,
            responder: tx,
        })
        .await
        .unwrap();
        let id = rx.await.unwrap();

        actix_rt::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(metrics.snapshot().bundles_delivered, 1);
        assert!(store.get(&id).unwrap().is_some());
    }

    #[actix_rt::test]
    async fn on_received_duplicate_is_not_redelivered() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = FileStore::open(dir.path()).unwrap();
        let neighbor_addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let neighbors = NeighborTable::from_entries([(BundleEid::from("dtn://next"), neighbor_addr)]);
        let metrics = Arc::new(Metrics::default());
        let addr = ForwardingAgent::new(
            BundleEid::from("dtn://relay"),
            store.clone(),
            neighbors,
            metrics.clone(),
            Arc::new(LoggingHook),
            None,
            config(),
        )
        .start();

        let bundle = Bundle::new(
            BundleEid::from("dtn://a"),
            BundleEid::from("dtn://b"),
            b"payload".to_vec(),
            now(),
            3600,
        );
        addr.send(OnReceived {
            bundle: bundle.clone(),
            from_store: false,
        })
        .await
        .unwrap();
        addr.send(OnReceived {
            bundle,
            from_store: false,
        })
        .await
        .unwrap();

        let snap = metrics.snapshot();
        assert_eq!(snap.bundles_received, 2);
        assert_eq!(snap.bundles_duplicate, 1);
    }
}
