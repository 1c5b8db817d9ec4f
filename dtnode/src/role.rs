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

/// Controls which default application hook a [`crate::node::Node`] wires
/// up. Workload generators themselves (the periodic telemetry source, the
/// pass-through relay, the logging sink) are out of scope here — only the
/// role they'd select is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Source,
    Relay,
    Sink,
}

impl Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            NodeRole::Source => "source",
            NodeRole::Relay => "relay",
            NodeRole::Sink => "sink",
        })
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown node_role {0:?}, expected one of source, relay, sink")]
pub struct ParseNodeRoleError(String);

impl FromStr for NodeRole {
    type Err = ParseNodeRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "source" => Ok(NodeRole::Source),
            "relay" => Ok(NodeRole::Relay),
            "sink" => Ok(NodeRole::Sink),
            other => Err(ParseNodeRoleError(other.to_string())),
        }
    }
}
