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

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bundle::Bundle;
use log::{error, info, warn};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::forwarding::ForwardingHandle;
use crate::metrics::Metrics;

/// Accept loop: a `tokio::select!` between `listener.accept()` and a
/// shutdown broadcast receiver, reading exactly one length-prefixed frame
/// per connection rather than holding a long-lived session open.
pub struct Listener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Listener {
    pub async fn bind(addr: SocketAddr) -> io::Result<Listener> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("listening for bundles on {local_addr}");
        Ok(Listener { listener, local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Runs until `shutdown` fires. Each accepted connection is handed to
    /// its own task so a slow or malicious peer can never stall the
    /// accept loop.
    pub async fn run(
        self,
        mut shutdown: broadcast::Receiver<()>,
        engine: ForwardingHandle,
        metrics: Arc<Metrics>,
        max_frame_bytes: usize,
    ) {
        loop {
            tokio::select! {
                conn = self.listener.accept() => {
                    match conn {
                        Ok((stream, peer)) => {
                            let engine = engine.clone();
                            let metrics = metrics.clone();
                            tokio::spawn(async move {
                                handle_connection(stream, peer, engine, metrics, max_frame_bytes).await;
                            });
                        }
                        Err(e) => error!("failed to accept a connection: {e}"),
                    }
                }
                _ = shutdown.recv() => {
                    info!("listener on {} shutting down", self.local_addr);
                    break;
                }
            }
        }
    }
}

async fn handle_connection(
    stream: tokio::net::TcpStream,
    peer: SocketAddr,
    engine: ForwardingHandle,
    metrics: Arc<Metrics>,
    max_frame_bytes: usize,
) {
    let frame = match transport::recv_frame(stream, max_frame_bytes).await {
        Ok(Some(frame)) => frame,
        Ok(None) => return,
        Err(e) => {
            warn!("malformed frame from {peer}: {e}");
            Metrics::inc(&metrics.malformed_frames);
            return;
        }
    };

    match Bundle::decode(&frame) {
        Ok(bundle) => engine.on_received(bundle),
        Err(e) => {
            warn!("undecodable bundle from {peer}: {e}");
            Metrics::inc(&metrics.malformed_frames);
        }
    }
}
