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

use std::sync::atomic::{AtomicU64, Ordering};

/// The counters exposed by `snapshot()`, plus the ambient per-error-kind
/// counters (`bundles_duplicate`, `malformed_frames`, `store_errors`,
/// `transport_errors`). Every field is an independent atomic; there is no
/// cross-counter invariant to protect, so plain `Relaxed` increments are
/// enough.
#[derive(Debug, Default)]
pub struct Metrics {
    pub bundles_sent: AtomicU64,
    pub bundles_received: AtomicU64,
    pub bundles_delivered: AtomicU64,
    pub bundles_forwarded: AtomicU64,
    pub bundles_expired: AtomicU64,
    pub bundles_stored: AtomicU64,
    pub bundles_duplicate: AtomicU64,
    pub malformed_frames: AtomicU64,
    pub store_errors: AtomicU64,
    pub transport_errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub bundles_sent: u64,
    pub bundles_received: u64,
    pub bundles_delivered: u64,
    pub bundles_forwarded: u64,
    pub bundles_expired: u64,
    pub bundles_stored: u64,
    pub bundles_duplicate: u64,
    pub malformed_frames: u64,
    pub store_errors: u64,
    pub transport_errors: u64,
}

impl Metrics {
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            bundles_sent: self.bundles_sent.load(Ordering::Relaxed),
            bundles_received: self.bundles_received.load(Ordering::Relaxed),
            bundles_delivered: self.bundles_delivered.load(Ordering::Relaxed),
            bundles_forwarded: self.bundles_forwarded.load(Ordering::Relaxed),
            bundles_expired: self.bundles_expired.load(Ordering::Relaxed),
            bundles_stored: self.bundles_stored.load(Ordering::Relaxed),
            bundles_duplicate: self.bundles_duplicate.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_increments() {
        let metrics = Metrics::default();
        Metrics::inc(&metrics.bundles_sent);
        Metrics::inc(&metrics.bundles_sent);
        Metrics::inc(&metrics.bundles_delivered);
        let snap = metrics.snapshot();
        assert_eq!(snap.bundles_sent, 2);
        assert_eq!(snap.bundles_delivered, 1);
        assert_eq!(snap.bundles_forwarded, 0);
    }
}
