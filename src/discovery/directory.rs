use async_std::channel::{self, Receiver, Sender};
use dashmap::{mapref::entry::Entry, DashMap};
use std::fmt::Debug;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// A live peer, as last heard from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    pub address: IpAddr,
    /// Port of the peer's RPC route.
    pub port: u16,
    /// Reverse DNS name, once resolved.
    pub hostname: Option<String>,
    pub first_seen: Instant,
    pub last_seen: Instant,
}

/// Fan-out of peer events to every subscriber. Subscribers that went away are pruned on the
/// next event.
#[derive(Default)]
struct Notifier {
    subscribers: Mutex<Vec<Sender<PeerRecord>>>,
}

impl Notifier {
    fn subscribe(&self) -> Receiver<PeerRecord> {
        let (sender, receiver) = channel::unbounded();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sender);
        receiver
    }

    fn publish(&self, record: &PeerRecord) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|subscriber| subscriber.try_send(record.clone()).is_ok());
    }
}

struct DirectoryInner {
    peers: DashMap<IpAddr, PeerRecord>,
    peer_port: u16,
    created: Notifier,
    dropped: Notifier,
}

/// Set of live peers, keyed by address.
///
/// The directory holds no timers. The [`Beacon`](crate::Beacon) feeds it with `observe` and
/// `reap`, tests can drive it by hand with explicit instants.
#[derive(Clone)]
pub struct PeerDirectory {
    inner: Arc<DirectoryInner>,
}

impl PeerDirectory {
    /// `peer_port` is the RPC port recorded for every peer.
    pub fn new(peer_port: u16) -> PeerDirectory {
        PeerDirectory {
            inner: Arc::new(DirectoryInner {
                peers: DashMap::new(),
                peer_port,
                created: Notifier::default(),
                dropped: Notifier::default(),
            }),
        }
    }

    /// Records an announcement from `address`. Returns `true` if the peer is new.
    pub fn observe(&self, address: IpAddr) -> bool {
        self.observe_at(address, Instant::now())
    }

    pub fn observe_at(&self, address: IpAddr, now: Instant) -> bool {
        let created = match self.inner.peers.entry(address) {
            Entry::Occupied(mut entry) => {
                let record = entry.get_mut();
                if now > record.last_seen {
                    record.last_seen = now;
                }
                None
            }
            Entry::Vacant(entry) => {
                let record = PeerRecord {
                    address,
                    port: self.inner.peer_port,
                    hostname: None,
                    first_seen: now,
                    last_seen: now,
                };
                entry.insert(record.clone());
                Some(record)
            }
        };

        match created {
            Some(record) => {
                info!(%address, "peer created");
                self.inner.created.publish(&record);
                true
            }
            None => false,
        }
    }

    /// Drops every peer not heard from for longer than `drop_span`.
    pub fn reap(&self, drop_span: Duration) -> Vec<PeerRecord> {
        self.reap_at(Instant::now(), drop_span)
    }

    pub fn reap_at(&self, now: Instant, drop_span: Duration) -> Vec<PeerRecord> {
        let is_stale =
            |record: &PeerRecord| now.saturating_duration_since(record.last_seen) > drop_span;

        let stale: Vec<IpAddr> = self
            .inner
            .peers
            .iter()
            .filter(|entry| is_stale(entry.value()))
            .map(|entry| *entry.key())
            .collect();

        let mut dropped = Vec::with_capacity(stale.len());

        for address in stale {
            // Re-checked under the shard lock, an announcement may have landed meanwhile.
            if let Some((_, record)) = self
                .inner
                .peers
                .remove_if(&address, |_, record| is_stale(record))
            {
                info!(%address, "peer dropped");
                self.inner.dropped.publish(&record);
                dropped.push(record);
            }
        }

        dropped
    }

    /// Forgets a peer right away. Subscribers see it as dropped.
    pub fn remove(&self, address: &IpAddr) -> Option<PeerRecord> {
        let (_, record) = self.inner.peers.remove(address)?;
        info!(%address, "peer removed");
        self.inner.dropped.publish(&record);
        Some(record)
    }

    pub(crate) fn set_hostname(&self, address: &IpAddr, hostname: String) {
        if let Some(mut record) = self.inner.peers.get_mut(address) {
            debug!(%address, hostname = hostname.as_str(), "peer hostname resolved");
            record.hostname = Some(hostname);
        }
    }

    /// Snapshot of the live peers, ordered by address.
    pub fn peers(&self) -> Vec<PeerRecord> {
        let mut peers: Vec<PeerRecord> = self
            .inner
            .peers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        peers.sort_by_key(|record| record.address);
        peers
    }

    pub fn get(&self, address: &IpAddr) -> Option<PeerRecord> {
        self.inner
            .peers
            .get(address)
            .map(|record| record.value().clone())
    }

    pub fn contains(&self, address: &IpAddr) -> bool {
        self.inner.peers.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.inner.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.peers.is_empty()
    }

    pub fn peer_port(&self) -> u16 {
        self.inner.peer_port
    }

    /// New receiver of peer creations. Every receiver gets every event.
    pub fn created(&self) -> Receiver<PeerRecord> {
        self.inner.created.subscribe()
    }

    /// New receiver of peer drops. Every receiver gets every event.
    pub fn dropped(&self) -> Receiver<PeerRecord> {
        self.inner.dropped.subscribe()
    }
}

impl Debug for PeerDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PeerDirectory ({} peers)", self.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[test]
    fn only_the_first_announcement_creates_a_peer() {
        let directory = PeerDirectory::new(8080);
        let start = Instant::now();

        assert!(directory.observe_at(ip(1), start));
        assert!(!directory.observe_at(ip(1), start + Duration::from_millis(10)));

        let record = directory.get(&ip(1)).unwrap();
        assert_eq!(record.port, 8080);
        assert_eq!(record.first_seen, start);
        assert_eq!(record.last_seen, start + Duration::from_millis(10));
    }

    #[test]
    fn reaping_drops_only_stale_peers() {
        let directory = PeerDirectory::new(8080);
        let start = Instant::now();
        let dropped = directory.dropped();

        directory.observe_at(ip(1), start);
        directory.observe_at(ip(2), start + Duration::from_secs(8));

        let reaped = directory.reap_at(start + Duration::from_secs(11), Duration::from_secs(10));

        assert_eq!(reaped.len(), 1);
        assert_eq!(reaped[0].address, ip(1));
        assert_eq!(directory.peers().len(), 1);
        assert_eq!(dropped.try_recv().unwrap().address, ip(1));
        assert!(dropped.try_recv().is_err());
    }

    #[test]
    fn every_subscriber_gets_every_event() {
        let directory = PeerDirectory::new(8080);
        let first = directory.created();
        let second = directory.created();

        directory.observe(ip(3));

        assert_eq!(first.try_recv().unwrap().address, ip(3));
        assert_eq!(second.try_recv().unwrap().address, ip(3));
    }

    #[test]
    fn closed_subscribers_are_pruned() {
        let directory = PeerDirectory::new(8080);
        drop(directory.created());
        let alive = directory.created();

        directory.observe(ip(4));
        directory.observe(ip(5));

        assert_eq!(alive.len(), 2);
        assert_eq!(
            directory
                .inner
                .created
                .subscribers
                .lock()
                .unwrap()
                .len(),
            1
        );
    }
}
