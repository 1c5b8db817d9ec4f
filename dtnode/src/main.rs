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

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use dtnode::common::config::{CliArgs, Config};
use dtnode::delivery_log::DeliveryLog;
use dtnode::hook::{ApplicationHook, ChannelHook, LoggingHook};
use dtnode::role::NodeRole;
use dtnode::Node;
use log::{error, info};

#[actix_rt::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("starting up");

    let config = match Config::from_args(CliArgs::parse()) {
        Ok(config) => config,
        Err(e) => {
            error!("configuration error: {e}");
            return ExitCode::from(2);
        }
    };
    info!("starting with config: {config:?}");

    let (hook, delivery_log): (Arc<dyn ApplicationHook>, Option<Arc<DeliveryLog>>) = match config.role {
        NodeRole::Sink => {
            let (hook, mut receiver) = ChannelHook::new();
            // Nothing in this binary consumes deliveries directly (the
            // application hook is for an embedding program); drain the
            // channel so an unconsumed sink doesn't grow without bound.
            tokio::spawn(async move { while receiver.recv().await.is_some() {} });

            let log_path = config.storage_dir.join("delivered.jsonl");
            match DeliveryLog::open(&log_path) {
                Ok(log) => (Arc::new(hook), Some(Arc::new(log))),
                Err(e) => {
                    error!("failed to open delivery log at {log_path:?}: {e}");
                    return ExitCode::FAILURE;
                }
            }
        }
        NodeRole::Source | NodeRole::Relay => (Arc::new(LoggingHook), None),
    };

    let node = match Node::start(config, hook, delivery_log).await {
        Ok(node) => node,
        Err(e) => {
            error!("fatal startup error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(sig) => sig,
        Err(e) => {
            error!("failed to install SIGTERM handler: {e}");
            return ExitCode::FAILURE;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
        _ = sigterm.recv() => info!("received SIGTERM"),
    }

    node.shutdown().await;
    info!("all done, see you");
    ExitCode::SUCCESS
}
