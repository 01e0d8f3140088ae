//! # Troupe
//!
//! Virtual actors for Rust services, local or spread over a small cluster.
//!
//! ## Overall features of Troupe
//!
//!  - Actors are **virtual**: they are addressed by a logical name and activated on their first
//!    message. There is no spawn and no address to keep.
//!  - Handlers are registered **explicitly** per actor type and message type.
//!  - Every handler of a process runs on **one worker**, in dispatch order, one at a time.
//!  - Peers **find each other** through UDP broadcast.
//!  - Messages for actors this process doesn't host are sent to a peer over **HTTP/JSON**, and
//!    every message for the same name lands on the same peer.
//!
//! ### Regarding the implementation:
//!
//!  - Troupe is **asynchronous** and uses `async_std` under the hood.
//!  - Messages are Serde types. Their response type is part of the message definition.
//!  - Logging goes through `tracing`. Install a subscriber to see it.
//!  - The scheduler queue is bounded: when it is full the oldest queued message is dropped and
//!    its sender gets an error.
//!
//! ## Troupe structure
//!
//! The main traits are:
//!
//! - [Actor](./trait.Actor.html): Represents an actor
//! - [Message](./trait.Message.html): Represents a message and the response it expects
//!
//! Actors handle messages through two traits:
//!
//! - [Respond](./trait.Respond.html): Receives a message and responds to it. One responder per
//!   actor type and message.
//! - [Receive](./trait.Receive.html): Observes a message without responding. Observers run after
//!   the responder and nobody waits for them.
//!
//! A [Scene](./struct.Scene.html) holds the registered handlers and the activated actors of the
//! process. A [Node](./struct.Node.html) adds discovery and the HTTP transport on top of it.
//!
//! ## Simple Example
//!
//! ```rust,no_run
//! use troupe::{Actor, Assistant, Message, Respond, Scene};
//! use async_trait::async_trait;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug)]
//! struct Employee {
//!     salary: u32,
//! }
//!
//! #[async_trait]
//! impl Actor for Employee {
//!     async fn activate(_: &str) -> Self {
//!         Employee {
//!             salary: 0, // Load from DB or set a default,
//!         }
//!     }
//! }
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct SalaryChanged(u32);
//!
//! impl Message for SalaryChanged {
//!     type Response = u32;
//! }
//!
//! #[async_trait]
//! impl Respond<SalaryChanged> for Employee {
//!     async fn handle(&mut self, message: SalaryChanged, _: &Assistant) -> u32 {
//!         let previous = self.salary;
//!         self.salary = message.0;
//!         previous
//!     }
//! }
//!
//! # async_std::task::block_on(async {
//! let scene = Scene::builder()
//!     .responder::<Employee, SalaryChanged>()
//!     .build();
//!
//! let previous = scene.dispatch("employee-42", SalaryChanged(55000)).await?;
//! assert_eq!(previous, 0);
//! # Ok::<(), troupe::DispatchError>(())
//! # });
//! ```
//!
//! ## Cluster
//!
//! ```rust,no_run
//! use troupe::{Node, NodeConfig, Scene};
//!
//! # async_std::task::block_on(async {
//! let node = Node::new(Scene::builder().build(), NodeConfig::from_env()?)?;
//! let _beacon = node.start_discovery().await?;
//!
//! // Calls for messages this scene has no responder for go to a discovered peer.
//! // node.send("calculator-1", Increment(5.0)).await?;
//!
//! node.serve().await?;
//! # Ok::<(), troupe::Error>(())
//! # });
//! ```

#![deny(unsafe_code)]

mod actors;
mod broker;
mod cluster;
mod config;
mod discovery;
mod error;
mod facade;
mod scene;
mod scheduler;
mod transport;

pub use actors::actor::Actor;
pub use actors::assistant::Assistant;
pub use actors::binding::HandlerKind;
pub use actors::handle::{Receive, Respond};
pub use actors::message::Message;
pub use cluster::{Cluster, ClusterConfig};
pub use config::{NodeConfig, CONFIG_ENV};
pub use discovery::beacon::{Beacon, BeaconConfig};
pub use discovery::directory::{PeerDirectory, PeerRecord};
pub use error::{
    ClusterError, ConfigError, DiscoveryError, DispatchError, Error, Result, TaskError,
    TransportError,
};
pub use facade::Node;
pub use scene::{Scene, SceneBuilder};
pub use scheduler::{QueueConfig, QueueStats, TaskHandle, TaskQueue};
pub use transport::communicator::{Communicator, CommunicatorConfig};
pub use transport::envelope::Envelope;
