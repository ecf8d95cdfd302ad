//! Many topology managers driven together over one [`MemoryNetwork`].

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::manager::{JoinState, TopologyManager};
use crate::memory::MemoryNetwork;
use std::collections::BTreeMap;
use tracing::{debug, trace};
use vast_types::{Coord, NodeId, Timestamp};

/// A set of in-process nodes sharing a clock.
///
/// Each [`step`](LocalMesh::step) advances the clock, delivers every message
/// that became due and then ticks every online node once.
#[derive(Debug)]
pub struct LocalMesh {
    network: MemoryNetwork,
    nodes: BTreeMap<NodeId, TopologyManager>,
}

impl LocalMesh {
    pub fn new(network: MemoryNetwork) -> Self {
        Self {
            network,
            nodes: BTreeMap::new(),
        }
    }

    /// Attaches a node to the network and creates its manager.
    pub fn spawn(
        &mut self,
        id: NodeId,
        public: bool,
        config: RelayConfig,
        physical: Option<Coord>,
    ) -> &TopologyManager {
        self.network.add_node(id, public);
        let manager = TopologyManager::new(config, &self.network.endpoint(id), physical);
        self.nodes.insert(id, manager);
        &self.nodes[&id]
    }

    pub fn network(&self) -> &MemoryNetwork {
        &self.network
    }

    pub fn now(&self) -> Timestamp {
        self.network.now()
    }

    pub fn node(&self, id: NodeId) -> Option<&TopologyManager> {
        self.nodes.get(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &TopologyManager> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Advances the clock by `dt`, delivers due messages, then ticks every
    /// online node. Returns the errors reported by the ticks.
    pub fn step(&mut self, dt: Timestamp) -> Vec<(NodeId, RelayError)> {
        self.deliver_only(dt);

        let mut errors = Vec::new();
        for (id, manager) in self.nodes.iter_mut() {
            if !self.network.is_online(*id) {
                continue;
            }
            let mut endpoint = self.network.endpoint(*id);
            if let Err(err) = manager.tick(&mut endpoint) {
                trace!(node = %id, %err, "tick reported error");
                errors.push((*id, err));
            }
        }
        errors
    }

    /// Advances the clock and delivers due messages without ticking.
    pub fn deliver_only(&mut self, dt: Timestamp) {
        self.network.advance(dt);

        for (target, envelope) in self.network.drain_due() {
            let Some(manager) = self.nodes.get_mut(&target) else {
                continue;
            };
            let mut endpoint = self.network.endpoint(target);
            manager.handle_message(envelope, &mut endpoint);
        }
    }

    /// Steps until `done` holds or `limit` clock units have passed.
    /// Returns whether `done` was reached.
    pub fn run_until<F>(&mut self, dt: Timestamp, limit: Timestamp, mut done: F) -> bool
    where
        F: FnMut(&LocalMesh) -> bool,
    {
        let deadline = self.now() + limit;
        while self.now() < deadline {
            if done(self) {
                return true;
            }
            self.step(dt);
        }
        done(self)
    }

    /// Takes a node offline; its peers receive `DISCONNECT`.
    pub fn take_offline(&mut self, id: NodeId) {
        debug!(node = %id, "taking node offline");
        self.network.set_online(id, false);
    }

    /// Whether every online node has joined.
    pub fn all_joined(&self) -> bool {
        self.nodes
            .iter()
            .filter(|(id, _)| self.network.is_online(**id))
            .all(|(_, manager)| manager.is_joined())
    }

    /// Number of online nodes in each join state.
    pub fn state_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for (id, manager) in &self.nodes {
            if self.network.is_online(*id) {
                *counts.entry(manager.state().to_string()).or_insert(0) += 1;
            }
        }
        counts
    }

    pub fn joined_count(&self) -> usize {
        self.nodes
            .values()
            .filter(|manager| manager.state() == JoinState::Joined)
            .count()
    }
}
