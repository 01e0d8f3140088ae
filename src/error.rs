//! Error types for every layer of the runtime.
//!
//! Each subsystem recovers its failures at its own boundary and hands them to
//! the caller as one of these values. Nothing crosses the dispatch, routing or
//! transport boundary as a panic.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Outcome of a job that never produced a value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Dropped from a full queue to make room for a newer job.
    #[error("task evicted from a full queue")]
    Evicted,

    /// The queue was closed before the job could run.
    #[error("task queue is closed")]
    Closed,

    /// The job panicked while running.
    #[error("task panicked: {0}")]
    Panicked(String),
}

/// Failures of a local dispatch through the [`Scene`](crate::Scene).
#[derive(Error, Debug)]
pub enum DispatchError {
    /// No responder is registered for the message.
    #[error("no responder registered for {descriptor}")]
    NoHandler { descriptor: String },

    /// An envelope named a message type this process does not know.
    #[error("unknown message descriptor {0}")]
    UnknownDescriptor(String),

    /// The envelope payload could not be decoded into the message type.
    #[error("cannot decode payload for {descriptor}: {source}")]
    Decode {
        descriptor: String,
        #[source]
        source: serde_json::Error,
    },

    /// The handler response could not be encoded.
    #[error("cannot encode response for {descriptor}: {source}")]
    Encode {
        descriptor: String,
        #[source]
        source: serde_json::Error,
    },

    /// The handler panicked. The actor instance survives.
    #[error("handler for {descriptor} failed: {message}")]
    Handler { descriptor: String, message: String },

    /// Two message types share a descriptor and the payload did not match the handler.
    #[error("message or response type mismatch for {descriptor}")]
    TypeMismatch { descriptor: String },

    /// The dispatch was evicted from the scheduler before running.
    #[error("dispatch of {descriptor} was evicted")]
    Evicted { descriptor: String },

    /// The scheduler is closed.
    #[error("scene is closed")]
    Closed,
}

impl DispatchError {
    pub(crate) fn from_task(descriptor: &str, error: TaskError) -> DispatchError {
        match error {
            TaskError::Evicted => DispatchError::Evicted {
                descriptor: descriptor.to_string(),
            },
            TaskError::Closed => DispatchError::Closed,
            TaskError::Panicked(message) => DispatchError::Handler {
                descriptor: descriptor.to_string(),
                message,
            },
        }
    }
}

/// Failures of an outbound RPC call.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The call did not finish before the configured timeout.
    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    /// The target is not a valid absolute URL.
    #[error("invalid url {url}: {message}")]
    InvalidUrl { url: String, message: String },

    /// Connection, DNS or protocol failure.
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    /// The peer answered with a non-success status.
    #[error("request to {url} answered with status {status}")]
    Status { url: String, status: u16 },

    /// The outgoing message could not be serialized.
    #[error("cannot encode envelope: {0}")]
    Encode(#[source] serde_json::Error),

    /// The response body could not be decoded into the expected type.
    #[error("cannot decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// The HTTP client could not be built.
    #[error("invalid client configuration: {0}")]
    Client(String),
}

/// Failures of the discovery socket.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("cannot bind discovery socket on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("discovery socket error: {0}")]
    Io(#[from] io::Error),
}

/// Failures of a routed send.
#[derive(Error, Debug)]
pub enum ClusterError {
    /// No live peer is known.
    #[error("no live peer to route {name}")]
    NoPeers { name: String },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Failures while loading a configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] io::Error),

    #[error("invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Any failure surfaced by the [`Node`](crate::Node) facade.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Cluster(#[from] ClusterError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The inbound server could not listen.
    #[error("server error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
