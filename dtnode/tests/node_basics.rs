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

//! In-process end-to-end tests: several `Node`s on loopback TCP ports in
//! one test binary, exercising direct delivery, relaying, duplicate
//! suppression, outage recovery, expiration, and restart-recovery.

use std::net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bundle::{Bundle, Eid};
use dtnode::common::config::Config;
use dtnode::hook::{ChannelHook, DeliveryRecord};
use dtnode::node::Node;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

fn reserve_port() -> u16 {
    let listener = StdTcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    listener.local_addr().unwrap().port()
}

fn test_config(eid: &str, storage_dir: PathBuf, listen_port: u16, neighbors: Vec<(Eid, SocketAddr)>) -> Config {
    Config {
        eid: Eid::from(eid),
        role: dtnode::role::NodeRole::Relay,
        listen_port,
        neighbors,
        storage_dir,
        default_lifetime: Duration::from_secs(3600),
        sweeper_period: Duration::from_millis(200),
        resend_period: Duration::from_millis(150),
        max_frame_bytes: 1 << 20,
        max_forward_workers: 4,
        connect_timeout: Duration::from_millis(500),
        write_timeout: Duration::from_millis(500),
        initial_backoff: Duration::from_millis(50),
        max_backoff: Duration::from_millis(200),
    }
}

async fn start_node(
    eid: &str,
    storage_dir: PathBuf,
    listen_port: u16,
    neighbors: Vec<(Eid, SocketAddr)>,
) -> (Node, UnboundedReceiver<DeliveryRecord>) {
    let (hook, receiver) = ChannelHook::new();
    let node = Node::start(test_config(eid, storage_dir, listen_port, neighbors), Arc::new(hook), None)
        .await
        .unwrap();
    (node, receiver)
}

async fn recv_one(receiver: &mut UnboundedReceiver<DeliveryRecord>) -> DeliveryRecord {
    timeout(Duration::from_secs(5), receiver.recv())
        .await
        .expect("delivery did not happen in time")
        .expect("hook channel closed unexpectedly")
}

#[actix_rt::test]
async fn direct_delivery_between_two_nodes() {
    let b_dir = tempfile::tempdir().unwrap();
    let (b, mut b_deliveries) = start_node("dtn://b", b_dir.path().to_path_buf(), 0, vec![]).await;
    let b_addr = b.listen_addr();

    let a_dir = tempfile::tempdir().unwrap();
    let (a, _a_deliveries) = start_node(
        "dtn://a",
        a_dir.path().to_path_buf(),
        0,
        vec![(Eid::from("dtn://b"), b_addr)],
    )
    .await;

    a.submit(Eid::from("dtn://b"), b"hello".to_vec(), 60).await;

    let record = recv_one(&mut b_deliveries).await;
    assert_eq!(record.source, Eid::from("dtn://a"));
    assert_eq!(record.payload, b"hello");
    assert_eq!(record.hop_count, 1);

    a.shutdown().await;
    b.shutdown().await;
}

#[actix_rt::test]
async fn two_hop_relay_forwards_and_delivers() {
    let b_dir = tempfile::tempdir().unwrap();
    let (b, mut b_deliveries) = start_node("dtn://b", b_dir.path().to_path_buf(), 0, vec![]).await;
    let b_addr = b.listen_addr();

    let r_dir = tempfile::tempdir().unwrap();
    let (r, _r_deliveries) = start_node(
        "dtn://r",
        r_dir.path().to_path_buf(),
        0,
        vec![(Eid::from("dtn://b"), b_addr)],
    )
    .await;
    let r_addr = r.listen_addr();

    let a_dir = tempfile::tempdir().unwrap();
    let (a, _a_deliveries) = start_node(
        "dtn://a",
        a_dir.path().to_path_buf(),
        0,
        vec![(Eid::from("dtn://r"), r_addr)],
    )
    .await;

    a.submit(Eid::from("dtn://b"), b"via relay".to_vec(), 60).await;

    let record = recv_one(&mut b_deliveries).await;
    assert_eq!(record.source, Eid::from("dtn://a"));
    assert_eq!(record.payload, b"via relay");
    assert_eq!(record.hop_count, 2);

    a.shutdown().await;
    r.shutdown().await;
    b.shutdown().await;
}

#[actix_rt::test]
async fn duplicate_arrival_is_counted_but_not_reforwarded() {
    let dir = tempfile::tempdir().unwrap();
    // No reachable neighbor: the bundle stays parked in the store after
    // the first forward attempt fails, so the second arrival can still
    // find it and be recognized as a duplicate.
    let unreachable: SocketAddr = (Ipv4Addr::LOCALHOST, reserve_port()).into();
    let (node, _deliveries) = start_node(
        "dtn://relay",
        dir.path().to_path_buf(),
        0,
        vec![(Eid::from("dtn://next"), unreachable)],
    )
    .await;

    let bundle = Bundle::new(Eid::from("dtn://a"), Eid::from("dtn://z"), b"payload".to_vec(), 1_700_000_000.0, 3600);
    node.engine.on_received(bundle.clone());
    node.engine.on_received(bundle);

    // Give both handler invocations a moment to run.
    actix_rt::time::sleep(Duration::from_millis(50)).await;

    let snap = node.metrics.snapshot();
    assert_eq!(snap.bundles_received, 2);
    assert_eq!(snap.bundles_duplicate, 1);

    node.shutdown().await;
}

#[actix_rt::test]
async fn survives_an_outage_and_delivers_once_the_neighbor_comes_back() {
    let b_port = reserve_port();
    let b_addr: SocketAddr = (Ipv4Addr::LOCALHOST, b_port).into();

    let a_dir = tempfile::tempdir().unwrap();
    let (a, _a_deliveries) = start_node(
        "dtn://a",
        a_dir.path().to_path_buf(),
        0,
        vec![(Eid::from("dtn://b"), b_addr)],
    )
    .await;

    // b is not listening yet: the first forward attempt(s) will fail and
    // back off.
    a.submit(Eid::from("dtn://b"), b"outage".to_vec(), 60).await;
    actix_rt::time::sleep(Duration::from_millis(200)).await;

    let b_dir = tempfile::tempdir().unwrap();
    let (b, mut b_deliveries) = start_node("dtn://b", b_dir.path().to_path_buf(), b_port, vec![]).await;

    let record = recv_one(&mut b_deliveries).await;
    assert_eq!(record.payload, b"outage");

    a.shutdown().await;
    b.shutdown().await;
}

#[actix_rt::test]
async fn expired_bundle_is_dropped_instead_of_delivered() {
    let dir = tempfile::tempdir().unwrap();
    let (node, mut deliveries) = start_node("dtn://sink", dir.path().to_path_buf(), 0, vec![]).await;

    let long_ago = Bundle::new(Eid::from("dtn://a"), Eid::from("dtn://sink"), b"stale".to_vec(), 1.0, 1);
    node.engine.on_received(long_ago.clone());
    actix_rt::time::sleep(Duration::from_millis(50)).await;

    assert!(timeout(Duration::from_millis(200), deliveries.recv()).await.is_err());
    assert_eq!(node.metrics.snapshot().bundles_expired, 1);
    assert!(node.store.get(&long_ago.id).unwrap().is_none());

    node.shutdown().await;
}

#[actix_rt::test]
async fn a_restarted_node_resumes_forwarding_pending_bundles() {
    let storage_dir = tempfile::tempdir().unwrap();
    let b_port = reserve_port();
    let b_addr: SocketAddr = (Ipv4Addr::LOCALHOST, b_port).into();

    {
        // b is down throughout this node's lifetime: the bundle is
        // submitted, fails to forward, and is still on disk when we shut
        // the node down (standing in for a crash).
        let (a, _deliveries) = start_node(
            "dtn://a",
            storage_dir.path().to_path_buf(),
            0,
            vec![(Eid::from("dtn://b"), b_addr)],
        )
        .await;
        a.submit(Eid::from("dtn://b"), b"resume me".to_vec(), 3600).await;
        actix_rt::time::sleep(Duration::from_millis(150)).await;
        a.shutdown().await;
    }

    let b_dir = tempfile::tempdir().unwrap();
    let (b, mut b_deliveries) = start_node("dtn://b", b_dir.path().to_path_buf(), b_port, vec![]).await;

    // Restarting "a" against the same storage_dir rehydrates the pending
    // bundle and retries it now that b is reachable.
    let (a2, _deliveries) = start_node(
        "dtn://a",
        storage_dir.path().to_path_buf(),
        0,
        vec![(Eid::from("dtn://b"), b_addr)],
    )
    .await;

    let record = recv_one(&mut b_deliveries).await;
    assert_eq!(record.payload, b"resume me");

    a2.shutdown().await;
    b.shutdown().await;
}
