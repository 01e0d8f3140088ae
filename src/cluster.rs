use crate::discovery::directory::{PeerDirectory, PeerRecord};
use crate::error::ClusterError;
use crate::transport::communicator::Communicator;
use crate::Message;
use dashmap::{mapref::entry::Entry, DashMap};
use rand::seq::SliceRandom;
use serde::Deserialize;
use std::fmt::Debug;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Path of the inbound route on every peer.
    pub route: String,
}

impl ClusterConfig {
    /// The route as an absolute path, `messages` and `/messages` being the same route.
    pub fn path(&self) -> String {
        if self.route.starts_with('/') {
            self.route.clone()
        } else {
            format!("/{}", self.route)
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> ClusterConfig {
        ClusterConfig {
            route: "/messages".to_string(),
        }
    }
}

/// Routes messages for a logical name to one of the discovered peers.
///
/// The first message for a name picks a peer at random. Later messages for that name go to the
/// same peer for as long as it stays in the directory, so the remote actor keeps its state.
#[derive(Clone)]
pub struct Cluster {
    directory: PeerDirectory,
    communicator: Communicator,
    route: Arc<str>,
    bindings: Arc<DashMap<String, IpAddr>>,
}

impl Cluster {
    pub fn new(directory: PeerDirectory, communicator: Communicator, config: ClusterConfig) -> Cluster {
        Cluster {
            directory,
            communicator,
            route: config.path().into(),
            bindings: Arc::new(DashMap::new()),
        }
    }

    /// Peer that serves `name`, binding one if needed. `None` when no peer is known.
    pub fn resolve(&self, name: &str) -> Option<PeerRecord> {
        let peers = self.directory.peers();

        if peers.is_empty() {
            return None;
        }

        match self.bindings.entry(name.to_string()) {
            Entry::Occupied(mut entry) => {
                if let Some(peer) = peers.iter().find(|peer| peer.address == *entry.get()) {
                    return Some(peer.clone());
                }

                let peer = peers.choose(&mut rand::thread_rng())?.clone();
                debug!(name, previous = %entry.get(), address = %peer.address, "rebinding name");
                entry.insert(peer.address);
                Some(peer)
            }
            Entry::Vacant(entry) => {
                let peer = peers.choose(&mut rand::thread_rng())?.clone();
                debug!(name, address = %peer.address, "binding name");
                entry.insert(peer.address);
                Some(peer)
            }
        }
    }

    /// Sends `message` to the actor `name` on the peer bound to it.
    pub async fn send<M: Message>(&self, name: &str, message: M) -> Result<M::Response, ClusterError> {
        let peer = self.resolve(name).ok_or_else(|| ClusterError::NoPeers {
            name: name.to_string(),
        })?;

        let url = self.url_of(&peer);

        Ok(self.communicator.send(&url, name, &message).await?)
    }

    pub fn url_of(&self, peer: &PeerRecord) -> String {
        format!(
            "http://{}{}",
            SocketAddr::new(peer.address, peer.port),
            self.route
        )
    }

    /// Path of the inbound route on every peer.
    pub fn route(&self) -> &str {
        &self.route
    }

    /// Current name bindings, ordered by name.
    pub fn bindings(&self) -> Vec<(String, IpAddr)> {
        let mut bindings: Vec<_> = self
            .bindings
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        bindings.sort();
        bindings
    }

    /// Drops the binding of `name`. The next message picks a peer again.
    pub fn forget(&self, name: &str) -> Option<IpAddr> {
        self.bindings.remove(name).map(|(_, address)| address)
    }

    pub fn directory(&self) -> &PeerDirectory {
        &self.directory
    }
}

impl Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cluster ({} bindings, {:?})",
            self.bindings.len(),
            self.directory
        )
    }
}
