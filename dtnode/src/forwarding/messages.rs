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

use actix::prelude::*;
use bundle::{Bundle, BundleId, Eid};
use tokio::sync::oneshot;
use transport::TransportError;

/// A local application handing the engine a new payload to send. The
/// engine builds the `Bundle`, stores it, and replies with its id on
/// `responder` once storage has happened — not before.
#[derive(Message)]
#[rtype(result = "")]
pub struct Submit {
    pub destination: Eid,
    pub payload: Vec<u8>,
    pub lifetime: u64,
    pub responder: oneshot::Sender<BundleId>,
}

/// A bundle that arrived over the network (from the listener) or was
/// rehydrated from disk at startup. `from_store` distinguishes the two so
/// rehydration doesn't get counted as a fresh arrival or flagged as a
/// duplicate of itself.
#[derive(Message)]
#[rtype(result = "")]
pub struct OnReceived {
    pub bundle: Bundle,
    pub from_store: bool,
}

/// Periodic re-sweep: re-examine the store and re-enqueue anything not
/// already in flight.
#[derive(Message)]
#[rtype(result = "")]
pub struct RetryTick;

/// Reported by a forward worker task once a transmission attempt
/// finishes, win or lose.
#[derive(Message)]
#[rtype(result = "")]
pub struct ForwardResult {
    pub id: BundleId,
    pub outcome: Result<(), ForwardError>,
}

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("no neighbor to forward to")]
    NoNeighbor,
    #[error(transparent)]
    Transport(#[from] TransportError),
}
