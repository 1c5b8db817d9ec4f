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

use serde::{Deserialize, Serialize};

use crate::eid::Eid;
use crate::error::{DecodeError, OversizeError};
use crate::id::BundleId;

/// A self-contained application datagram plus DTN metadata.
///
/// The wire and disk encodings are identical (CBOR, via `encode`/`decode`)
/// so a stored image can be streamed directly onto the transport and vice
/// versa.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub id: BundleId,
    pub source: Eid,
    pub destination: Eid,
    pub payload: Vec<u8>,
    pub created_at: f64,
    pub lifetime: u64,
    pub hop_count: u32,
    pub path: Vec<Eid>,
}

impl Bundle {
    /// Builds a freshly-submitted bundle: `hop_count = 0`, `path = []`, and
    /// `id` derived from the fields that define deduplication identity.
    pub fn new(source: Eid, destination: Eid, payload: Vec<u8>, created_at: f64, lifetime: u64) -> Self {
        let id = BundleId::derive(&source, &destination, &payload, created_at);
        Bundle {
            id,
            source,
            destination,
            payload,
            created_at,
            lifetime,
            hop_count: 0,
            path: Vec::new(),
        }
    }

    pub fn is_expired(&self, now: f64) -> bool {
        now > self.created_at + self.lifetime as f64
    }

    /// Produces the forward-image of this bundle: `hop_count` incremented
    /// and `self_eid` appended to `path`. `hop_count == path.len()` is
    /// maintained as an invariant.
    pub fn forwarded_via(&self, self_eid: &Eid) -> Bundle {
        let mut next = self.clone();
        next.hop_count += 1;
        next.path.push(self_eid.clone());
        next
    }

    pub fn encode(&self) -> Vec<u8> {
        serde_cbor::to_vec(self).expect("Bundle serialization is infallible")
    }

    pub fn decode(bytes: &[u8]) -> Result<Bundle, DecodeError> {
        Ok(serde_cbor::from_slice(bytes)?)
    }

    pub fn decode_checked(bytes: &[u8], max_frame_bytes: usize) -> Result<Bundle, FrameError> {
        if bytes.len() > max_frame_bytes {
            return Err(FrameError::Oversize(OversizeError {
                size: bytes.len(),
                max: max_frame_bytes,
            }));
        }
        Ok(Bundle::decode(bytes)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Oversize(#[from] OversizeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Bundle {
        Bundle::new(
            Eid::from("dtn://a"),
            Eid::from("dtn://b"),
            b"hello".to_vec(),
            1_700_000_000.0,
            3600,
        )
    }

    #[test]
    fn frame_round_trips() {
        let bundle = sample();
        let encoded = bundle.encode();
        let decoded = Bundle::decode(&encoded).unwrap();
        assert_eq!(decoded, bundle);
    }

    #[test]
    fn forward_increments_hop_count_and_extends_path() {
        let bundle = sample();
        let relayed = bundle.forwarded_via(&Eid::from("dtn://r"));
        assert_eq!(relayed.hop_count, 1);
        assert_eq!(relayed.path, vec![Eid::from("dtn://r")]);
        assert_eq!(relayed.hop_count as usize, relayed.path.len());
    }

    #[test]
    fn expiry_is_strictly_after_created_at_plus_lifetime() {
        let bundle = sample();
        assert!(!bundle.is_expired(1_700_003_600.0));
        assert!(bundle.is_expired(1_700_003_600.1));
    }

    #[test]
    fn oversize_frame_is_rejected_before_decode() {
        let bundle = sample();
        let encoded = bundle.encode();
        let err = Bundle::decode_checked(&encoded, encoded.len() - 1).unwrap_err();
        assert!(matches!(err, FrameError::Oversize(_)));
    }
}
