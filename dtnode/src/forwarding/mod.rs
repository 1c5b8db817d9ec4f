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

pub mod agent;
pub mod messages;

use actix::prelude::*;
use bundle::{Bundle, BundleId, Eid};
use tokio::sync::oneshot;

pub use agent::{ForwardingAgent, ForwardingConfig};
pub use messages::{ForwardError, ForwardResult, OnReceived, RetryTick, Submit};

/// Thin, cloneable handle around `Addr<ForwardingAgent>` — the API the
/// listener and `Node` use, so neither has to depend on the actor's
/// message types directly.
#[derive(Clone)]
pub struct ForwardingHandle(Addr<ForwardingAgent>);

impl ForwardingHandle {
    pub fn new(addr: Addr<ForwardingAgent>) -> Self {
        ForwardingHandle(addr)
    }

    pub fn on_received(&self, bundle: Bundle) {
        self.0.do_send(OnReceived {
            bundle,
            from_store: false,
        });
    }

    /// Re-enters `bundle` into dispatch without counting it as a fresh
    /// arrival or a duplicate of itself — used once at startup per bundle
    /// [`crate::store::FileStore::open`] rehydrates from disk.
    pub fn rehydrate(&self, bundle: Bundle) {
        self.0.do_send(OnReceived {
            bundle,
            from_store: true,
        });
    }

    pub async fn submit(&self, destination: Eid, payload: Vec<u8>, lifetime: u64) -> BundleId {
        let (responder, rx) = oneshot::channel();
        self.0
            .send(Submit {
                destination,
                payload,
                lifetime,
                responder,
            })
            .await
            .expect("forwarding agent actor is alive for the node's lifetime");
        rx.await.expect("forwarding agent always replies to Submit")
    }
}
