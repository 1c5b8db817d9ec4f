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

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

use bundle::Eid;
use clap::Parser;

use crate::role::NodeRole;

/// Command-line / environment surface: every option can be set by flag or
/// by environment variable, via clap's `env` feature.
#[derive(Debug, Parser)]
#[command(name = "dtnode", about = "A minimal store-and-forward DTN node")]
pub struct CliArgs {
    /// This node's endpoint identifier.
    #[arg(long, env = "NODE_ID")]
    pub node_id: String,

    /// One of source, relay, sink; controls the default application hook.
    #[arg(long, env = "NODE_ROLE", default_value = "relay")]
    pub node_role: String,

    #[arg(long, env = "LISTEN_PORT", default_value_t = 4556)]
    pub listen_port: u16,

    /// Comma-separated `eid:host:port` entries.
    #[arg(long, env = "NEIGHBORS", default_value = "")]
    pub neighbors: String,

    #[arg(long, env = "STORAGE_DIR", default_value = "./dtn_bundles")]
    pub storage_dir: PathBuf,

    #[arg(long, env = "DEFAULT_LIFETIME_S", default_value_t = 3600)]
    pub default_lifetime_s: u64,

    #[arg(long, env = "SWEEPER_PERIOD_S", default_value_t = 60)]
    pub sweeper_period_s: u64,

    #[arg(long, env = "RESEND_PERIOD_S", default_value_t = 30)]
    pub resend_period_s: u64,

    #[arg(long, env = "MAX_FRAME_BYTES", default_value_t = 1_048_576)]
    pub max_frame_bytes: usize,

    #[arg(long, env = "MAX_FORWARD_WORKERS", default_value_t = 4)]
    pub max_forward_workers: usize,

    #[arg(long, env = "CONNECT_TIMEOUT_S", default_value_t = 10)]
    pub connect_timeout_s: u64,

    #[arg(long, env = "WRITE_TIMEOUT_S", default_value_t = 10)]
    pub write_timeout_s: u64,

    #[arg(long, env = "INITIAL_BACKOFF_S", default_value_t = 1)]
    pub initial_backoff_s: u64,

    #[arg(long, env = "MAX_BACKOFF_S", default_value_t = 60)]
    pub max_backoff_s: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("node_id must not be empty")]
    EmptyNodeId,
    #[error(transparent)]
    BadRole(#[from] crate::role::ParseNodeRoleError),
    #[error("bad neighbor spec {0:?}: expected eid:host:port")]
    BadNeighborSpec(String),
    #[error("could not resolve neighbor address {host}:{port}: {source}")]
    UnresolvableNeighbor {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

/// Fully-validated node configuration. Built from [`CliArgs`] by
/// [`Config::from_args`]; bad input (an unparseable neighbor spec, an
/// empty node id) is a configuration error, fatal at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub eid: Eid,
    pub role: NodeRole,
    pub listen_port: u16,
    pub neighbors: Vec<(Eid, SocketAddr)>,
    pub storage_dir: PathBuf,
    pub default_lifetime: Duration,
    pub sweeper_period: Duration,
    pub resend_period: Duration,
    pub max_frame_bytes: usize,
    pub max_forward_workers: usize,
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Config {
    pub fn from_args(args: CliArgs) -> Result<Config, ConfigError> {
        if args.node_id.trim().is_empty() {
            return Err(ConfigError::EmptyNodeId);
        }
        let role: NodeRole = args.node_role.parse()?;
        let neighbors = parse_neighbors(&args.neighbors)?;

        Ok(Config {
            eid: Eid::from(args.node_id),
            role,
            listen_port: args.listen_port,
            neighbors,
            storage_dir: args.storage_dir,
            default_lifetime: Duration::from_secs(args.default_lifetime_s),
            sweeper_period: Duration::from_secs(args.sweeper_period_s),
            resend_period: Duration::from_secs(args.resend_period_s),
            max_frame_bytes: args.max_frame_bytes,
            max_forward_workers: args.max_forward_workers,
            connect_timeout: Duration::from_secs(args.connect_timeout_s),
            write_timeout: Duration::from_secs(args.write_timeout_s),
            initial_backoff: Duration::from_secs(args.initial_backoff_s),
            max_backoff: Duration::from_secs(args.max_backoff_s),
        })
    }
}

fn parse_neighbors(raw: &str) -> Result<Vec<(Eid, SocketAddr)>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            // Split from the right: the eid itself (e.g. `dtn://r`) may
            // contain colons, but host and port never do.
            let mut parts = entry.rsplitn(3, ':');
            let (Some(port), Some(host), Some(eid)) =
                (parts.next(), parts.next(), parts.next())
            else {
                return Err(ConfigError::BadNeighborSpec(entry.to_string()));
            };
            let port: u16 = port
                .parse()
                .map_err(|_| ConfigError::BadNeighborSpec(entry.to_string()))?;
            let addr = (host, port)
                .to_socket_addrs()
                .map_err(|source| ConfigError::UnresolvableNeighbor {
                    host: host.to_string(),
                    port,
                    source,
                })?
                .next()
                .ok_or_else(|| ConfigError::UnresolvableNeighbor {
                    host: host.to_string(),
                    port,
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses"),
                })?;
            Ok((Eid::from(host_eid(eid)), addr))
        })
        .collect()
}

fn host_eid(raw: &str) -> String {
    raw.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_single_neighbor() {
        let neighbors = parse_neighbors("dtn://r:127.0.0.1:4557").unwrap();
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].0, Eid::from("dtn://r"));
        assert_eq!(neighbors[0].1.port(), 4557);
    }

    #[test]
    fn parses_multiple_comma_separated_neighbors() {
        let neighbors =
            parse_neighbors("dtn://r:127.0.0.1:4557,dtn://s:127.0.0.1:4558").unwrap();
        assert_eq!(neighbors.len(), 2);
    }

    #[test]
    fn rejects_malformed_entries() {
        assert!(parse_neighbors("dtn://r-only").is_err());
        assert!(parse_neighbors("dtn://r:127.0.0.1:not-a-port").is_err());
    }

    #[test]
    fn empty_neighbor_string_yields_no_neighbors() {
        assert!(parse_neighbors("").unwrap().is_empty());
    }
}
