//! An in-process network for running many topology managers in one process.
//!
//! Delivery is FIFO per sender/receiver pair, delayed by a configurable
//! latency function over a shared logical clock. Nodes can be switched
//! offline, at which point every peer they exchanged messages with receives a
//! `DISCONNECT` from them, the way a connection-oriented transport would
//! report a dropped link.

use crate::context::NetworkContext;
use crate::error::TransportError;
use crate::message::{Envelope, RelayMessage};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use tracing::{debug, trace};
use vast_types::{NodeId, Timestamp};

/// One-way latency between two nodes, in clock units.
pub type LatencyFn = Box<dyn Fn(NodeId, NodeId) -> Timestamp + Send + Sync>;

/// Default port assigned to in-memory nodes.
pub const DEFAULT_PORT: u16 = 3737;

#[derive(Debug, Clone)]
struct MemoryNode {
    address: SocketAddr,
    public: bool,
    online: bool,
    /// Peers this node exchanged messages with
    links: BTreeSet<NodeId>,
    /// Address mappings learned through `notify_mapping`
    mappings: HashMap<NodeId, SocketAddr>,
}

/// Counters kept by the in-memory network.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkStats {
    pub sent: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub send_failures: u64,
}

/// The shared in-memory network.
pub struct MemoryNetwork {
    clock: Timestamp,
    nodes: BTreeMap<NodeId, MemoryNode>,
    in_flight: BTreeMap<(Timestamp, u64), (NodeId, Envelope)>,
    sequence: u64,
    latency: LatencyFn,
    stats: NetworkStats,
}

impl fmt::Debug for MemoryNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryNetwork")
            .field("clock", &self.clock)
            .field("nodes", &self.nodes.len())
            .field("in_flight", &self.in_flight.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new(Box::new(|_, _| 1))
    }
}

impl MemoryNetwork {
    /// Creates a network whose one-way delays come from `latency`.
    /// Delays below one clock unit are raised to one.
    pub fn new(latency: LatencyFn) -> Self {
        Self {
            clock: 0,
            nodes: BTreeMap::new(),
            in_flight: BTreeMap::new(),
            sequence: 0,
            latency,
            stats: NetworkStats::default(),
        }
    }

    /// Creates a network with the same delay between every pair.
    pub fn with_constant_latency(latency: Timestamp) -> Self {
        Self::new(Box::new(move |_, _| latency))
    }

    /// The synthetic address given to node `id`.
    pub fn address_for(id: NodeId) -> SocketAddr {
        let raw = id.raw();
        let ip = Ipv4Addr::new(10, ((raw >> 16) & 0xff) as u8, ((raw >> 8) & 0xff) as u8, (raw & 0xff) as u8);
        SocketAddr::V4(SocketAddrV4::new(ip, DEFAULT_PORT))
    }

    /// Attaches a node and returns its address. Re-adding a node brings it
    /// back online with its previous links forgotten.
    pub fn add_node(&mut self, id: NodeId, public: bool) -> SocketAddr {
        let address = Self::address_for(id);
        self.nodes.insert(
            id,
            MemoryNode {
                address,
                public,
                online: true,
                links: BTreeSet::new(),
                mappings: HashMap::new(),
            },
        );
        debug!(node = %id, %address, public, "node attached to memory network");
        address
    }

    pub fn now(&self) -> Timestamp {
        self.clock
    }

    pub fn advance(&mut self, dt: Timestamp) {
        self.clock += dt;
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_online(&self, id: NodeId) -> bool {
        self.nodes.get(&id).is_some_and(|node| node.online)
    }

    pub fn address_of(&self, id: NodeId) -> Option<SocketAddr> {
        self.nodes.get(&id).map(|node| node.address)
    }

    /// The address `id` was told to use for `peer`, if any.
    pub fn mapping(&self, id: NodeId, peer: NodeId) -> Option<SocketAddr> {
        self.nodes.get(&id)?.mappings.get(&peer).copied()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Switches a node on or off.
    ///
    /// Going offline drops everything addressed to the node and sends a
    /// `DISCONNECT` on its behalf to every online peer it was linked to.
    pub fn set_online(&mut self, id: NodeId, online: bool) {
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        if node.online == online {
            return;
        }
        node.online = online;

        if online {
            debug!(node = %id, "node back online");
            return;
        }

        let address = node.address;
        let links: Vec<NodeId> = std::mem::take(&mut node.links).into_iter().collect();

        let before = self.in_flight.len();
        self.in_flight.retain(|_, (target, _)| *target != id);
        self.stats.dropped += (before - self.in_flight.len()) as u64;

        debug!(node = %id, peers = links.len(), "node offline, notifying peers");
        for peer in links {
            if !self.is_online(peer) {
                continue;
            }
            if let Some(peer_node) = self.nodes.get_mut(&peer) {
                peer_node.links.remove(&id);
            }
            let envelope = Envelope {
                from: id,
                from_address: address,
                message: RelayMessage::Disconnect,
            };
            self.enqueue(id, peer, envelope);
        }
    }

    /// Removes and returns every message due at the current clock, in
    /// delivery order. Messages for nodes that went offline are dropped.
    pub fn drain_due(&mut self) -> Vec<(NodeId, Envelope)> {
        let mut due = Vec::new();
        while let Some(entry) = self.in_flight.first_entry() {
            if entry.key().0 > self.clock {
                break;
            }
            let (target, envelope) = entry.remove();
            if self.is_online(target) {
                self.stats.delivered += 1;
                due.push((target, envelope));
            } else {
                self.stats.dropped += 1;
            }
        }
        due
    }

    /// A [`NetworkContext`] view of the network for node `id`.
    pub fn endpoint(&mut self, id: NodeId) -> Endpoint<'_> {
        Endpoint { network: self, id }
    }

    fn enqueue(&mut self, from: NodeId, to: NodeId, envelope: Envelope) {
        let delay = (self.latency)(from, to).max(1);
        let key = (self.clock + delay, self.sequence);
        self.sequence += 1;
        self.in_flight.insert(key, (to, envelope));
        self.stats.sent += 1;
    }

    fn send_from(
        &mut self,
        from: NodeId,
        target: NodeId,
        message: RelayMessage,
    ) -> Result<(), TransportError> {
        let from_address = match self.nodes.get(&from) {
            Some(node) if node.online => node.address,
            _ => return Err(TransportError::Offline(from)),
        };

        if !self.is_online(target) {
            self.stats.send_failures += 1;
            trace!(from = %from, to = %target, kind = message.kind(), "target unreachable");
            return Err(TransportError::Unreachable(target));
        }

        for (a, b) in [(from, target), (target, from)] {
            if a != b {
                if let Some(node) = self.nodes.get_mut(&a) {
                    node.links.insert(b);
                }
            }
        }

        let envelope = Envelope {
            from,
            from_address,
            message,
        };
        self.enqueue(from, target, envelope);
        Ok(())
    }
}

/// One node's view of a [`MemoryNetwork`].
#[derive(Debug)]
pub struct Endpoint<'a> {
    network: &'a mut MemoryNetwork,
    id: NodeId,
}

impl NetworkContext for Endpoint<'_> {
    fn local_id(&self) -> NodeId {
        self.id
    }

    fn local_address(&self) -> SocketAddr {
        self.network
            .address_of(self.id)
            .unwrap_or_else(|| MemoryNetwork::address_for(self.id))
    }

    fn is_public(&self) -> bool {
        self.network
            .nodes
            .get(&self.id)
            .is_some_and(|node| node.public)
    }

    fn now(&self) -> Timestamp {
        self.network.clock
    }

    fn notify_mapping(&mut self, id: NodeId, address: SocketAddr) {
        if let Some(node) = self.network.nodes.get_mut(&self.id) {
            node.mappings.insert(id, address);
        }
    }

    fn send(&mut self, target: NodeId, message: RelayMessage) -> Result<(), TransportError> {
        self.network.send_from(self.id, target, message)
    }
}
