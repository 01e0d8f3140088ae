use crate::cluster::Cluster;
use crate::config::NodeConfig;
use crate::discovery::beacon::Beacon;
use crate::discovery::directory::PeerDirectory;
use crate::error::{DispatchError, Error};
use crate::scene::Scene;
use crate::transport::communicator::Communicator;
use crate::{Message, Respond};
use async_std::task;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, info};

/// Node is the main interface of a process taking part in a cluster.
///
/// It puts together the local [`Scene`], the peers found by discovery and the HTTP transport.
/// Messages are handled locally when this process has a responder for them and routed to a
/// peer otherwise.
///
/// ```rust,no_run
/// use troupe::{Node, NodeConfig, Scene};
///
/// # async_std::task::block_on(async {
/// let scene = Scene::builder().build();
/// let node = Node::new(scene, NodeConfig::default())?;
///
/// // Keep the beacon alive, dropping it stops the announcements.
/// let _beacon = node.start_discovery().await?;
///
/// node.serve().await?;
/// # Ok::<(), troupe::Error>(())
/// # });
/// ```
pub struct Node {
    scene: Scene,
    communicator: Communicator,
    cluster: Cluster,
    config: Arc<NodeConfig>,
}

impl Node {
    /// Builds a node around `scene`. Nothing is listening or announced yet.
    pub fn new(scene: Scene, config: NodeConfig) -> Result<Node, Error> {
        let communicator = Communicator::new(scene.clone(), config.communicator.clone())?;
        let directory = PeerDirectory::new(config.beacon.peer_port);
        let cluster = Cluster::new(directory, communicator.clone(), config.cluster.clone());

        Ok(Node {
            scene,
            communicator,
            cluster,
            config: Arc::new(config),
        })
    }

    /// Sends a message to the actor `name` and waits for the response.
    ///
    /// If a local actor responds to `M` the message never leaves the process. Otherwise it is
    /// sent to the peer bound to `name`.
    pub async fn send<M: Message>(&self, name: &str, message: M) -> Result<M::Response, Error> {
        if self.scene.has_responder::<M>() {
            return Ok(self.scene.dispatch(name, message).await?);
        }

        self.send_remote(name, message).await
    }

    /// Same as `send` method, but sync version.
    pub fn send_sync<M: Message>(&self, name: &str, message: M) -> Result<M::Response, Error> {
        task::block_on(async move { self.send(name, message).await })
    }

    /// Sends a message to the local actor of type `A`, ignoring other local responders.
    pub async fn send_local<A: Respond<M>, M: Message>(
        &self,
        name: &str,
        message: M,
    ) -> Result<M::Response, DispatchError> {
        self.scene.send_to::<A, M>(name, message).await
    }

    /// Sends a message to a peer even if a local actor could answer it.
    pub async fn send_remote<M: Message>(
        &self,
        name: &str,
        message: M,
    ) -> Result<M::Response, Error> {
        Ok(self.cluster.send(name, message).await?)
    }

    /// Hands a message to the local observers of `name`.
    pub fn notify<M: Message>(&self, name: &str, message: M) -> usize {
        self.scene.notify(name, message)
    }

    /// Starts announcing this node and feeding the directory used for routing.
    ///
    /// The returned beacon runs until it is stopped or dropped.
    pub async fn start_discovery(&self) -> Result<Beacon, Error> {
        let beacon =
            Beacon::start_with(self.config.beacon.clone(), self.cluster.directory().clone())
                .await?;

        info!(local_addr = %beacon.local_addr(), "discovery started");

        Ok(beacon)
    }

    /// Mounts the inbound route on an existing server.
    pub fn mount<State>(&self, app: &mut tide::Server<State>)
    where
        State: Clone + Send + Sync + 'static,
    {
        self.communicator.subscribe(app, self.cluster.route());
    }

    /// A server with only the inbound route mounted, the node as its state.
    pub fn app(&self) -> tide::Server<Node> {
        let mut app = tide::with_state(self.clone());
        self.mount(&mut app);
        app
    }

    /// Serves the inbound route on the configured address until the server fails.
    pub async fn serve(&self) -> Result<(), Error> {
        let listen = self.config.listen;

        info!(%listen, route = self.cluster.route(), "serving");

        self.app().listen(listen).await?;

        debug!("server stopped");

        Ok(())
    }

    /// Closes the local scene. Pending local dispatches fail with `DispatchError::Closed`.
    pub fn stop(&self) {
        self.scene.close();
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    pub fn directory(&self) -> &PeerDirectory {
        self.cluster.directory()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }
}

impl Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Node ({:?}, {:?})", self.scene, self.cluster)
    }
}

impl Clone for Node {
    fn clone(&self) -> Self {
        Node {
            scene: self.scene.clone(),
            communicator: self.communicator.clone(),
            cluster: self.cluster.clone(),
            config: self.config.clone(),
        }
    }
}
