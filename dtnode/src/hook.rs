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

use bundle::{BundleId, Eid};
use log::info;
use serde::Serialize;
use tokio::sync::mpsc;

/// One locally-delivered bundle, handed to the application hook and
/// written to the delivery log. `e2e_delay` (`delivered_at - created_at`)
/// is what makes this record useful for end-to-end latency analysis.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryRecord {
    pub bundle_id: BundleId,
    pub source: Eid,
    pub destination: Eid,
    pub payload: Vec<u8>,
    pub hop_count: u32,
    pub created_at: f64,
    pub delivered_at: f64,
    pub e2e_delay: f64,
}

/// The embedding-program surface an application uses to observe local
/// deliveries: a plain trait rather than a network API, since nothing
/// here needs an out-of-process client.
pub trait ApplicationHook: Send + Sync {
    fn on_delivered(&self, record: &DeliveryRecord);
}

/// Default hook for `source`/`relay` roles: just logs, at `info` level.
#[derive(Debug, Default)]
pub struct LoggingHook;

impl ApplicationHook for LoggingHook {
    fn on_delivered(&self, record: &DeliveryRecord) {
        info!(
            "delivered bundle {} from {} ({} bytes, {} hops)",
            record.bundle_id,
            record.source,
            record.payload.len(),
            record.hop_count
        );
    }
}

/// Default hook for the `sink` role: forwards every delivery over an
/// unbounded channel so an embedding program (a test, a workload sink)
/// can poll for them.
#[derive(Debug, Clone)]
pub struct ChannelHook {
    sender: mpsc::UnboundedSender<DeliveryRecord>,
}

impl ChannelHook {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DeliveryRecord>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (ChannelHook { sender }, receiver)
    }
}

impl ApplicationHook for ChannelHook {
    fn on_delivered(&self, record: &DeliveryRecord) {
        // A dropped receiver just means nobody is listening any more;
        // the delivery itself already happened and is not retried.
        let _ = self.sender.send(record.clone());
    }
}
