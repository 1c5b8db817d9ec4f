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

/// Transient transport failures: recovered per-connection, never fatal to
/// the node.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connect to {0} failed: {1}")]
    Connect(std::net::SocketAddr, std::io::Error),
    #[error("connect/write to {0} timed out")]
    Timeout(std::net::SocketAddr),
    #[error("io error talking to {0}: {1}")]
    Io(std::net::SocketAddr, std::io::Error),
}
