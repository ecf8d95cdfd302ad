//! Relay mesh configuration types and defaults.
//!
//! All clock-valued settings are expressed in units of the node's logical
//! clock (the same units the [`NetworkContext`](crate::NetworkContext) reports
//! from `now()`, and the same units round-trip samples are measured in).

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use vast_types::{NodeId, Timestamp};

fn default_as_relay() -> bool { true }
fn default_tolerance() -> f64 { 0.5 }
fn default_error() -> f64 { 1.0 }
fn default_constant_error() -> f64 { 0.1 }
fn default_constant_fraction() -> f64 { 0.1 }
fn default_max_concurrent_ping() -> usize { 5 }
fn default_max_relay_queries() -> u32 { 10 }
fn default_ping_interval() -> Timestamp { 500 }
fn default_query_timeout() -> Timestamp { 1000 }
fn default_join_timeout() -> Timestamp { 1000 }

/// A well-known node used to seed an empty relay directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryPoint {
    /// Identifier of the entry node
    pub id: NodeId,
    /// Address the entry node listens on
    pub address: SocketAddr,
}

/// Configuration for a single node's topology manager.
///
/// Every field has a default, so a TOML table may specify only what it
/// wants to change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Whether this node is willing to act as a relay (only honored when public)
    #[serde(default = "default_as_relay")]
    pub as_relay: bool,
    /// Maximum number of clients accepted as a relay (0 means unlimited)
    #[serde(default)]
    pub client_limit: usize,
    /// Maximum directory size kept once joined (0 means unlimited)
    #[serde(default)]
    pub relay_limit: usize,
    /// Local error below which the network coordinate is considered settled
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Initial error of a fresh estimate
    #[serde(default = "default_error")]
    pub default_error: f64,
    /// Vivaldi error-smoothing constant (C_e)
    #[serde(default = "default_constant_error")]
    pub constant_error: f64,
    /// Vivaldi movement constant (C_c)
    #[serde(default = "default_constant_fraction")]
    pub constant_fraction: f64,
    /// Upper bound on relays probed per round, and on gossiped list length
    #[serde(default = "default_max_concurrent_ping")]
    pub max_concurrent_ping: usize,
    /// Probe rounds after which the coordinate is committed even if unsettled
    #[serde(default = "default_max_relay_queries")]
    pub max_relay_queries: u32,
    /// Interval between keep-alive probe rounds
    #[serde(default = "default_ping_interval")]
    pub ping_interval: Timestamp,
    /// Time to wait for a nearest-relay query reply before re-issuing
    #[serde(default = "default_query_timeout")]
    pub query_timeout: Timestamp,
    /// Time to wait for a join reply before trying the next candidate
    #[serde(default = "default_join_timeout")]
    pub join_timeout: Timestamp,
    /// Nodes used to seed an empty directory
    #[serde(default)]
    pub entry_points: Vec<EntryPoint>,
    /// The well-known bootstrap node receiving REGISTER and BADLANDMARK reports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap_id: Option<NodeId>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            as_relay: default_as_relay(),
            client_limit: 0,
            relay_limit: 0,
            tolerance: default_tolerance(),
            default_error: default_error(),
            constant_error: default_constant_error(),
            constant_fraction: default_constant_fraction(),
            max_concurrent_ping: default_max_concurrent_ping(),
            max_relay_queries: default_max_relay_queries(),
            ping_interval: default_ping_interval(),
            query_timeout: default_query_timeout(),
            join_timeout: default_join_timeout(),
            entry_points: Vec::new(),
            bootstrap_id: None,
        }
    }
}

impl RelayConfig {
    /// Validates the configuration for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tolerance > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "tolerance",
                reason: format!("must be positive, got {}", self.tolerance),
            });
        }

        if !(self.default_error >= 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "default_error",
                reason: format!("must not be negative, got {}", self.default_error),
            });
        }

        for (field, value) in [
            ("constant_error", self.constant_error),
            ("constant_fraction", self.constant_fraction),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: format!("must be within (0, 1], got {value}"),
                });
            }
        }

        if self.max_concurrent_ping == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_concurrent_ping",
                reason: "must be greater than 0".to_string(),
            });
        }

        for (field, value) in [
            ("ping_interval", self.ping_interval),
            ("query_timeout", self.query_timeout),
            ("join_timeout", self.join_timeout),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be greater than 0".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Address of the bootstrap node, if it is one of the entry points.
    pub fn bootstrap_address(&self) -> Option<SocketAddr> {
        let bootstrap = self.bootstrap_id?;
        self.entry_points
            .iter()
            .find(|entry| entry.id == bootstrap)
            .map(|entry| entry.address)
    }
}
