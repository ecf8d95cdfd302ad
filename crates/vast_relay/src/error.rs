//! Error types for the relay mesh.
//!
//! Most faults in the overlay are absorbed locally (a relay is pruned, a
//! sample is dropped, a request is retried on the next timeout). The types
//! here cover what still has to cross an API boundary.

use vast_types::NodeId;

/// Failures reported by a [`NetworkContext`](crate::NetworkContext) when a
/// message cannot be handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The target has no live connection and cannot be reached
    #[error("node {0} is unreachable")]
    Unreachable(NodeId),

    /// The local node is not attached to the network
    #[error("local node {0} is offline")]
    Offline(NodeId),
}

/// Errors surfaced by the topology manager.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RelayError {
    /// No relay is currently known; recoverable once gossip repopulates the directory
    #[error("no relay available, joining is not currently possible")]
    NoRelayAvailable,

    /// A round-trip sample was zero or negative and cannot be used
    #[error("corrupt round-trip sample ({rtt}) from node {peer}")]
    CorruptSample { peer: NodeId, rtt: f64 },

    /// Sending failed at the transport
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Rejected configuration values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// A field holds a value outside its allowed range
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        field: &'static str,
        reason: String,
    },
}
