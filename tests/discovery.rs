mod common;

use async_std::future::timeout;
use common::*;
use std::net::{IpAddr, Ipv4Addr};
use std::time::{Duration, Instant};
use troupe::{Beacon, BeaconConfig};

const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

fn beacon_config(port: u16, announce_port: u16, role: &str, peer_role: &str) -> BeaconConfig {
    BeaconConfig {
        port,
        announce_port,
        broadcast_address: LOOPBACK,
        role: role.to_string(),
        peer_role: peer_role.to_string(),
        peer_port: 8080,
        send_interval: Duration::from_millis(100),
        poll_interval: Duration::from_millis(1),
        clear_span: Duration::from_millis(50),
        drop_span: Duration::from_secs(1),
    }
}

#[async_std::test]
async fn beacons_find_each_other_and_notice_departures() {
    init_tracing();
    let (left_port, right_port) = (free_udp_port(), free_udp_port());

    let left = Beacon::start(beacon_config(left_port, right_port, "node", "node"))
        .await
        .unwrap();
    let created = left.directory().created();
    let dropped = left.directory().dropped();

    let announcing = Instant::now();
    let right = Beacon::start(beacon_config(right_port, left_port, "node", "node"))
        .await
        .unwrap();

    let peer = timeout(Duration::from_secs(3), created.recv())
        .await
        .expect("peer never discovered")
        .unwrap();
    assert!(announcing.elapsed() < Duration::from_millis(200));
    assert_eq!(peer.address, LOOPBACK);
    assert_eq!(peer.port, 8080);
    assert!(left.directory().contains(&LOOPBACK));

    timeout(Duration::from_secs(3), async {
        while !right.directory().contains(&LOOPBACK) {
            async_std::task::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("discovery is not symmetric");

    right.stop();
    let silent = Instant::now();

    let gone = timeout(Duration::from_secs(4), dropped.recv())
        .await
        .expect("peer never dropped")
        .unwrap();
    // The last announcement left at most one send interval before `stop`.
    let drop_after = silent.elapsed();
    assert!(drop_after >= Duration::from_millis(900), "dropped after {:?}", drop_after);
    assert!(drop_after <= Duration::from_millis(1100), "dropped after {:?}", drop_after);
    assert_eq!(gone.address, LOOPBACK);
    assert!(left.directory().is_empty());
}

#[async_std::test]
async fn announcements_for_another_role_are_ignored() {
    let (server_port, client_port) = (free_udp_port(), free_udp_port());

    let server = Beacon::start(beacon_config(server_port, client_port, "server", "server"))
        .await
        .unwrap();
    let _client = Beacon::start(beacon_config(client_port, server_port, "client", "server"))
        .await
        .unwrap();

    async_std::task::sleep(Duration::from_millis(500)).await;

    // The client only announces "client", which the server doesn't accept.
    assert!(server.directory().is_empty());
}
