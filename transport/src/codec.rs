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

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

const LENGTH_PREFIX_BYTES: usize = 4;

/// Wire framing: a 4-byte big-endian length prefix `L`
/// (`0 < L <= max_frame_bytes`) followed by `L` bytes of payload. One
/// connection carries exactly one frame; there is no handshake and no
/// heartbeat.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_bytes: usize,
}

impl FrameCodec {
    pub fn new(max_frame_bytes: usize) -> Self {
        FrameCodec { max_frame_bytes }
    }

    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameCodecError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("frame of {size} bytes exceeds max_frame_bytes of {max}")]
    Oversize { size: usize, max: usize },
}

impl Decoder for FrameCodec {
    type Item = BytesMut;
    type Error = FrameCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_PREFIX_BYTES {
            return Ok(None);
        }

        let length = u32::from_be_bytes(src[..LENGTH_PREFIX_BYTES].try_into().unwrap()) as usize;
        if length == 0 {
            return Err(FrameCodecError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "zero-length frame",
            )));
        }
        if length > self.max_frame_bytes {
            return Err(FrameCodecError::Oversize {
                size: length,
                max: self.max_frame_bytes,
            });
        }

        if src.len() < LENGTH_PREFIX_BYTES + length {
            src.reserve(LENGTH_PREFIX_BYTES + length - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_BYTES);
        Ok(Some(src.split_to(length)))
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = FrameCodecError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.len() > self.max_frame_bytes {
            return Err(FrameCodecError::Oversize {
                size: item.len(),
                max: self.max_frame_bytes,
            });
        }
        dst.reserve(LENGTH_PREFIX_BYTES + item.len());
        dst.put_u32(item.len() as u32);
        dst.extend_from_slice(&item);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_then_decodes_a_frame() {
        let mut codec = FrameCodec::new(1024);
        let mut buf = BytesMut::new();
        codec.encode(Bytes::from_static(b"hello"), &mut buf).unwrap();

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame[..], b"hello");
        assert!(buf.is_empty());
    }

    #[test]
    fn waits_for_a_full_frame_before_decoding() {
        let mut codec = FrameCodec::new(1024);
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&5u32.to_be_bytes());
        buf.extend_from_slice(b"he");
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"llo");
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&frame[..], b"hello");
    }

    #[test]
    fn rejects_oversize_frames() {
        let mut codec = FrameCodec::new(4);
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&5u32.to_be_bytes());
        buf.extend_from_slice(b"hello");
        assert!(matches!(
            codec.decode(&mut buf),
            Err(FrameCodecError::Oversize { size: 5, max: 4 })
        ));
    }

    #[test]
    fn rejects_zero_length_frames() {
        let mut codec = FrameCodec::new(1024);
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&0u32.to_be_bytes());
        assert!(codec.decode(&mut buf).is_err());
    }
}
