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

use std::collections::HashMap;
use std::net::SocketAddr;

use bundle::Eid;

/// Static `eid -> (host, port)` mapping. Built once at startup from
/// [`crate::common::config::Config::neighbors`] and never mutated again,
/// so plain read-only sharing behind an `Arc` (done by the caller) is
/// enough for safe concurrent reads — there is no write path to race
/// against.
#[derive(Debug, Default, Clone)]
pub struct NeighborTable {
    neighbors: HashMap<Eid, SocketAddr>,
}

impl NeighborTable {
    pub fn new() -> Self {
        NeighborTable::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (Eid, SocketAddr)>) -> Self {
        NeighborTable {
            neighbors: entries.into_iter().collect(),
        }
    }

    pub fn add_neighbor(&mut self, eid: Eid, addr: SocketAddr) {
        self.neighbors.insert(eid, addr);
    }

    pub fn lookup(&self, eid: &Eid) -> Option<SocketAddr> {
        self.neighbors.get(eid).copied()
    }

    /// The routing policy is static single-next-hop: there is exactly one
    /// neighbor and every non-local bundle goes to it, regardless of its
    /// destination.
    pub fn single_next_hop(&self) -> Option<SocketAddr> {
        self.neighbors.values().next().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_a_known_neighbor() {
        let mut table = NeighborTable::new();
        let addr: SocketAddr = "127.0.0.1:4556".parse().unwrap();
        table.add_neighbor(Eid::from("dtn://r"), addr);
        assert_eq!(table.lookup(&Eid::from("dtn://r")), Some(addr));
        assert_eq!(table.lookup(&Eid::from("dtn://unknown")), None);
    }

    #[test]
    fn single_next_hop_ignores_destination() {
        let addr: SocketAddr = "127.0.0.1:4556".parse().unwrap();
        let table = NeighborTable::from_entries([(Eid::from("dtn://r"), addr)]);
        assert_eq!(table.single_next_hop(), Some(addr));
    }

    #[test]
    fn empty_table_has_no_next_hop() {
        assert_eq!(NeighborTable::new().single_next_hop(), None);
    }
}
