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

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use actix::prelude::*;
use log::{error, info};

use crate::metrics::Metrics;
use crate::store::FileStore;

/// Periodic expiration sweep. Implemented as an actor for symmetry with
/// [`crate::forwarding::ForwardingAgent`]; a bare `tokio::task` would do
/// just as well.
pub struct Sweeper {
    store: FileStore,
    metrics: Arc<Metrics>,
    period: Duration,
}

impl Sweeper {
    pub fn new(store: FileStore, metrics: Arc<Metrics>, period: Duration) -> Self {
        Sweeper { store, metrics, period }
    }

    fn sweep(&self) {
        let bundles = match self.store.iter() {
            Ok(bundles) => bundles,
            Err(e) => {
                error!("expiration sweep failed to read store: {e}");
                Metrics::inc(&self.metrics.store_errors);
                return;
            }
        };
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before unix epoch")
            .as_secs_f64();

        let mut expired = 0u64;
        for bundle in bundles {
            if bundle.is_expired(now) {
                // A concurrent delete by the forwarding engine is not an
                // error; either way the bundle is gone afterwards.
                self.store.delete(&bundle.id);
                expired += 1;
            }
        }
        if expired > 0 {
            info!("expiration sweep removed {expired} bundle(s)");
            for _ in 0..expired {
                Metrics::inc(&self.metrics.bundles_expired);
            }
        }
    }
}

impl Actor for Sweeper {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let period = self.period;
        ctx.run_interval(period, |act, _ctx| act.sweep());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bundle::{Bundle, Eid};

    #[actix_rt::test]
    async fn sweep_removes_only_expired_bundles() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = FileStore::open(dir.path()).unwrap();

        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs_f64();
        let fresh = Bundle::new(Eid::from("dtn://a"), Eid::from("dtn://b"), b"x".to_vec(), now, 3600);
        let expired = Bundle::new(Eid::from("dtn://a"), Eid::from("dtn://b"), b"y".to_vec(), now - 10.0, 1);
        store.put(&fresh).unwrap();
        store.put(&expired).unwrap();

        let metrics = Arc::new(Metrics::default());
        let sweeper = Sweeper::new(store.clone(), metrics.clone(), Duration::from_secs(3600));
        sweeper.sweep();

        assert!(store.get(&fresh.id).unwrap().is_some());
        assert!(store.get(&expired.id).unwrap().is_none());
        assert_eq!(metrics.snapshot().bundles_expired, 1);
    }
}
