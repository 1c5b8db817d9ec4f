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

pub mod codec;
pub mod errors;

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use log::debug;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

pub use codec::{FrameCodec, FrameCodecError};
pub use errors::TransportError;

/// Opens a TCP connection to `addr`, writes exactly one length-prefixed
/// frame, and lets the stream drop — the receiver's clean close is the
/// only acknowledgement.
///
/// `connect_timeout` and `write_timeout` bound the two blocking points so a
/// black-holed peer cannot pin a forward worker indefinitely.
pub async fn send_frame(
    addr: SocketAddr,
    frame: Bytes,
    max_frame_bytes: usize,
    connect_timeout: Duration,
    write_timeout: Duration,
) -> Result<(), TransportError> {
    let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| TransportError::Timeout(addr))?
        .map_err(|e| TransportError::Connect(addr, e))?;

    let mut framed = Framed::new(stream, FrameCodec::new(max_frame_bytes));

    tokio::time::timeout(write_timeout, framed.send(frame))
        .await
        .map_err(|_| TransportError::Timeout(addr))?
        .map_err(|e| match e {
            FrameCodecError::Io(e) => TransportError::Io(addr, e),
            FrameCodecError::Oversize { .. } => {
                TransportError::Io(addr, std::io::Error::other("frame too large to send"))
            }
        })?;

    debug!("sent frame of {} bytes to {addr}", framed.codec().max_frame_bytes());
    Ok(())
}

/// Reads exactly one length-prefixed frame from an already-accepted
/// connection. Returns `Ok(None)` if the peer closed before sending
/// anything (not an error: an empty connection attempt is simply ignored).
pub async fn recv_frame(
    stream: TcpStream,
    max_frame_bytes: usize,
) -> Result<Option<Bytes>, FrameCodecError> {
    let mut framed = Framed::new(stream, FrameCodec::new(max_frame_bytes));
    match framed.next().await {
        Some(Ok(frame)) => Ok(Some(frame.freeze())),
        Some(Err(e)) => Err(e),
        None => Ok(None),
    }
}
