use crate::discovery::directory::PeerDirectory;
use crate::error::DiscoveryError;
use async_std::io;
use async_std::net::UdpSocket;
use async_std::stream;
use async_std::task;
use futures::StreamExt;
use serde::Deserialize;
use std::fmt::Debug;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Settings of a [`Beacon`].
///
/// `role` is the token this node announces, `peer_role` the token it accepts. A client that
/// only wants to find servers announces `client` and accepts `server`, for example.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BeaconConfig {
    /// Port the beacon listens on.
    pub port: u16,
    /// Port announcements are sent to.
    pub announce_port: u16,
    pub broadcast_address: IpAddr,
    pub role: String,
    pub peer_role: String,
    /// RPC port recorded for discovered peers.
    pub peer_port: u16,
    #[serde(with = "crate::config::millis")]
    pub send_interval: Duration,
    #[serde(with = "crate::config::millis")]
    pub poll_interval: Duration,
    #[serde(with = "crate::config::millis")]
    pub clear_span: Duration,
    #[serde(with = "crate::config::millis")]
    pub drop_span: Duration,
}

impl Default for BeaconConfig {
    fn default() -> BeaconConfig {
        BeaconConfig {
            port: 2000,
            announce_port: 2000,
            broadcast_address: IpAddr::V4(Ipv4Addr::BROADCAST),
            role: "troupe".to_string(),
            peer_role: "troupe".to_string(),
            peer_port: 8080,
            send_interval: Duration::from_secs(1),
            poll_interval: Duration::from_millis(1),
            clear_span: Duration::from_secs(5),
            drop_span: Duration::from_secs(10),
        }
    }
}

/// Announces this node over UDP broadcast and keeps a [`PeerDirectory`] of the nodes it hears.
///
/// Announcing, listening and reaping run as three independent tasks until the beacon is
/// stopped or dropped.
///
/// ```rust,no_run
/// use troupe::{Beacon, BeaconConfig};
///
/// # async_std::task::block_on(async {
/// let beacon = Beacon::start(BeaconConfig::default()).await?;
/// let created = beacon.directory().created();
///
/// while let Ok(peer) = created.recv().await {
///     println!("found {}", peer.address);
/// }
/// # Ok::<(), troupe::DiscoveryError>(())
/// # });
/// ```
pub struct Beacon {
    directory: PeerDirectory,
    local_addr: SocketAddr,
    stopped: Arc<AtomicBool>,
}

impl Beacon {
    pub async fn start(config: BeaconConfig) -> Result<Beacon, DiscoveryError> {
        let directory = PeerDirectory::new(config.peer_port);
        Beacon::start_with(config, directory).await
    }

    /// Starts a beacon that feeds an existing directory.
    pub async fn start_with(
        config: BeaconConfig,
        directory: PeerDirectory,
    ) -> Result<Beacon, DiscoveryError> {
        let bind = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), config.port);
        let socket = UdpSocket::bind(bind)
            .await
            .map_err(|source| DiscoveryError::Bind {
                port: config.port,
                source,
            })?;
        socket.set_broadcast(true)?;

        let local_addr = socket.local_addr()?;
        let socket = Arc::new(socket);
        let stopped = Arc::new(AtomicBool::new(false));

        debug!(%local_addr, role = config.role.as_str(), "beacon started");

        task::spawn(announce(
            socket.clone(),
            SocketAddr::new(config.broadcast_address, config.announce_port),
            config.role.clone(),
            config.send_interval,
            stopped.clone(),
        ));

        task::spawn(listen(
            socket,
            directory.clone(),
            config.peer_role.clone(),
            config.poll_interval,
            stopped.clone(),
        ));

        task::spawn(reap(
            directory.clone(),
            config.clear_span,
            config.drop_span,
            stopped.clone(),
        ));

        Ok(Beacon {
            directory,
            local_addr,
            stopped,
        })
    }

    pub fn directory(&self) -> &PeerDirectory {
        &self.directory
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops the three tasks. Each one exits at its next tick.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            debug!(local_addr = %self.local_addr, "beacon stopped");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

impl Drop for Beacon {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Debug for Beacon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Beacon ({}, {:?})", self.local_addr, self.directory)
    }
}

async fn announce(
    socket: Arc<UdpSocket>,
    target: SocketAddr,
    role: String,
    every: Duration,
    stopped: Arc<AtomicBool>,
) {
    let mut ticks = stream::interval(every);

    while !stopped.load(Ordering::Acquire) {
        if let Err(error) = socket.send_to(role.as_bytes(), target).await {
            warn!(%target, %error, "announcement failed");
        }

        ticks.next().await;
    }
}

async fn listen(
    socket: Arc<UdpSocket>,
    directory: PeerDirectory,
    peer_role: String,
    poll_interval: Duration,
    stopped: Arc<AtomicBool>,
) {
    let mut buffer = [0u8; 512];

    while !stopped.load(Ordering::Acquire) {
        let (length, sender) = match io::timeout(poll_interval, socket.recv_from(&mut buffer)).await
        {
            Ok(received) => received,
            Err(error) if error.kind() == io::ErrorKind::TimedOut => continue,
            Err(error) => {
                warn!(%error, "discovery receive failed");
                task::sleep(poll_interval).await;
                continue;
            }
        };

        match std::str::from_utf8(&buffer[..length]) {
            Ok(token) if token == peer_role => {}
            _ => {
                trace!(%sender, "ignoring foreign datagram");
                continue;
            }
        }

        let address = sender.ip();

        if directory.observe(address) {
            task::spawn(resolve_hostname(directory.clone(), address));
        }
    }
}

async fn reap(
    directory: PeerDirectory,
    clear_span: Duration,
    drop_span: Duration,
    stopped: Arc<AtomicBool>,
) {
    let mut ticks = stream::interval(clear_span);

    while ticks.next().await.is_some() {
        if stopped.load(Ordering::Acquire) {
            break;
        }

        directory.reap(drop_span);
    }
}

async fn resolve_hostname(directory: PeerDirectory, address: IpAddr) {
    match task::spawn_blocking(move || dns_lookup::lookup_addr(&address)).await {
        Ok(hostname) => directory.set_hostname(&address, hostname),
        Err(error) => debug!(%address, %error, "reverse lookup failed"),
    }
}
