//! Node configuration.
//!
//! Every component has its own config struct with defaults. [`NodeConfig`] groups them and can be
//! read from a JSON file where durations are given in milliseconds:
//!
//! ```json
//! {
//!     "listen": "0.0.0.0:8080",
//!     "queue": { "capacity": 100 },
//!     "beacon": { "port": 2000, "send_interval": 1000, "drop_span": 10000 },
//!     "communicator": { "timeout": 15000 },
//!     "cluster": { "route": "/messages" }
//! }
//! ```
//!
//! Missing fields take their default value.

use crate::cluster::ClusterConfig;
use crate::discovery::beacon::BeaconConfig;
use crate::error::ConfigError;
use crate::scheduler::QueueConfig;
use crate::transport::communicator::CommunicatorConfig;
use serde::Deserialize;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use tracing::debug;

/// Environment variable naming the config file read by [`NodeConfig::from_env`].
pub const CONFIG_ENV: &str = "TROUPE_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Address the inbound route is served on.
    pub listen: SocketAddr,
    /// Whether the node announces itself and looks for peers.
    pub discovery: bool,
    /// Settings for the scene's queue. The scene is built before the node, so this only takes
    /// effect through `SceneBuilder::config`.
    pub queue: QueueConfig,
    pub beacon: BeaconConfig,
    pub communicator: CommunicatorConfig,
    pub cluster: ClusterConfig,
}

impl Default for NodeConfig {
    fn default() -> NodeConfig {
        NodeConfig {
            listen: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080)),
            discovery: true,
            queue: QueueConfig::default(),
            beacon: BeaconConfig::default(),
            communicator: CommunicatorConfig::default(),
            cluster: ClusterConfig::default(),
        }
    }
}

impl NodeConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<NodeConfig, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        debug!(path = %path.display(), "loading config");

        NodeConfig::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<NodeConfig, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Reads the file named by `TROUPE_CONFIG`, or returns the defaults when it is not set.
    pub fn from_env() -> Result<NodeConfig, ConfigError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => NodeConfig::from_file(path),
            None => Ok(NodeConfig::default()),
        }
    }
}

/// `serde(with)` helper for durations written as milliseconds.
pub(crate) mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn missing_fields_keep_their_defaults() {
        let config = NodeConfig::from_json(
            r#"{"queue": {"capacity": 5}, "beacon": {"send_interval": 250, "role": "server"}}"#,
        )
        .unwrap();

        assert_eq!(config.queue.capacity, 5);
        assert_eq!(config.beacon.send_interval, Duration::from_millis(250));
        assert_eq!(config.beacon.role, "server");
        assert_eq!(config.beacon.drop_span, Duration::from_secs(10));
        assert_eq!(config.communicator.timeout, Duration::from_secs(15));
        assert_eq!(config.cluster.route, "/messages");
        assert!(config.discovery);
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        assert!(matches!(
            NodeConfig::from_json("{\"queue\": 3"),
            Err(ConfigError::Parse(_))
        ));
    }
}
