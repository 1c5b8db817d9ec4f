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

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::eid::Eid;

/// Content-addressed bundle identifier: the first 16 bytes of
/// `sha256(source || "\0" || destination || "\0" || payload || "\0" || created_at)`,
/// rendered as lowercase hex.
///
/// Two submissions with byte-identical `(source, destination, payload,
/// created_at)` collide on this id by design; that collision is what the
/// store uses to recognize and drop duplicate arrivals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BundleId([u8; 16]);

impl BundleId {
    pub fn derive(source: &Eid, destination: &Eid, payload: &[u8], created_at: f64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(source.as_str().as_bytes());
        hasher.update(b"\0");
        hasher.update(destination.as_str().as_bytes());
        hasher.update(b"\0");
        hasher.update(payload);
        hasher.update(b"\0");
        hasher.update(canonical_decimal(created_at).as_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        BundleId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

/// Canonical decimal rendering of a creation timestamp: fixed-precision,
/// independent of the platform's default float formatting, so that two
/// senders serializing the same timestamp always hash the same bytes.
fn canonical_decimal(value: f64) -> String {
    format!("{value:.6}")
}

impl Display for BundleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("malformed bundle id: {0}")]
pub struct ParseBundleIdError(String);

impl FromStr for BundleId {
    type Err = ParseBundleIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decoded = hex::decode(s).map_err(|e| ParseBundleIdError(e.to_string()))?;
        if decoded.len() != 16 {
            return Err(ParseBundleIdError(format!(
                "expected 16 bytes, got {}",
                decoded.len()
            )));
        }
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&decoded);
        Ok(BundleId(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_in_its_inputs() {
        let a = BundleId::derive(&Eid::from("dtn://a"), &Eid::from("dtn://b"), b"hello", 1.0);
        let b = BundleId::derive(&Eid::from("dtn://a"), &Eid::from("dtn://b"), b"hello", 1.0);
        assert_eq!(a, b);
    }

    #[test]
    fn differs_when_any_input_differs() {
        let base = BundleId::derive(&Eid::from("dtn://a"), &Eid::from("dtn://b"), b"hello", 1.0);
        assert_ne!(
            base,
            BundleId::derive(&Eid::from("dtn://a"), &Eid::from("dtn://c"), b"hello", 1.0)
        );
        assert_ne!(
            base,
            BundleId::derive(&Eid::from("dtn://a"), &Eid::from("dtn://b"), b"world", 1.0)
        );
        assert_ne!(
            base,
            BundleId::derive(&Eid::from("dtn://a"), &Eid::from("dtn://b"), b"hello", 2.0)
        );
    }

    #[test]
    fn round_trips_through_hex() {
        let id = BundleId::derive(&Eid::from("dtn://a"), &Eid::from("dtn://b"), b"hello", 1.0);
        let rendered = id.to_string();
        assert_eq!(rendered.parse::<BundleId>().unwrap(), id);
    }
}
