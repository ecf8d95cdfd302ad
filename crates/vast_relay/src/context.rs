//! The seam between a topology manager and whatever carries its messages.

use crate::error::TransportError;
use crate::message::RelayMessage;
use std::fmt::Debug;
use std::net::SocketAddr;
use vast_types::{NodeId, Timestamp};

/// Services a [`TopologyManager`](crate::TopologyManager) needs from its host.
///
/// The manager never blocks on the network. Every call here must return
/// immediately: `send` only enqueues, and any reply comes back later as an
/// ordinary inbound message.
///
/// # Implementation Notes
///
/// * `now()` must be monotonic and use the same units as the relay
///   configuration's timeouts, since round-trip samples are measured with it.
/// * `send()` reports failure only when the target is known to be unreachable
///   right now. A message that is lost later is indistinguishable from a slow
///   one and must not be reported.
/// * Messages between one pair of nodes must be delivered in send order.
pub trait NetworkContext: Debug {
    /// Identifier of the local node.
    fn local_id(&self) -> NodeId;

    /// Address other nodes use to reach the local node.
    fn local_address(&self) -> SocketAddr;

    /// Whether the local node is reachable from the outside (required to act
    /// as a relay).
    fn is_public(&self) -> bool;

    /// Current reading of the local logical clock.
    fn now(&self) -> Timestamp;

    /// Records how to reach `id`, so later sends by id can succeed.
    fn notify_mapping(&mut self, id: NodeId, address: SocketAddr);

    /// Enqueues `message` for `target`.
    fn send(&mut self, target: NodeId, message: RelayMessage) -> Result<(), TransportError>;
}
