//! # Topology Manager
//!
//! Gives a node a usable proximity coordinate and a live connection to its
//! nearest known relay.
//!
//! ## Join State Machine
//!
//! ```text
//!   ABSENT   --(coordinate committed)-->  QUERYING
//!   ABSENT   --(no relay known at all)-->  JOINED   (first node, own relay)
//!   QUERYING --(query answered)-------->  JOINING
//!   JOINING  --(join accepted)--------->  JOINED
//!   JOINED   --(current relay lost)---->  QUERYING
//! ```
//!
//! A rejected or unanswered join is retried against the next-closest known
//! relay, wrapping around once the directory is exhausted.
//!
//! ## Driving the Manager
//!
//! The manager is single-threaded and tick-driven. The host calls
//! [`TopologyManager::handle_message`] for every inbound message and
//! [`TopologyManager::tick`] once per clock advance, passing a
//! [`NetworkContext`] each time.

mod handlers;
mod maintenance;

use crate::config::RelayConfig;
use crate::context::NetworkContext;
use crate::coordinate::{CoordinateEstimator, VivaldiParams};
use crate::directory::RelayDirectory;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::SocketAddr;
use tracing::debug;
use vast_types::{Coord, NodeId, PhysicalEstimate, RelayRecord, Timestamp};

/// Progress of a node through the join protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinState {
    /// No usable coordinate yet
    Absent,
    /// Looking for the nearest relay
    Querying,
    /// Waiting for a join reply
    Joining,
    /// Attached to a relay (possibly itself)
    Joined,
}

impl fmt::Display for JoinState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JoinState::Absent => "ABSENT",
            JoinState::Querying => "QUERYING",
            JoinState::Joining => "JOINING",
            JoinState::Joined => "JOINED",
        };
        f.write_str(name)
    }
}

/// Running counters kept by each manager.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologyStats {
    /// Round-trip samples fed into the coordinate estimator
    pub samples_applied: u64,
    /// Round-trip samples discarded as corrupt
    pub samples_rejected: u64,
    /// Nearest-relay queries passed on to a closer relay
    pub queries_forwarded: u64,
    /// Nearest-relay queries answered by this node
    pub queries_answered: u64,
    /// Relays dropped from the directory for any reason
    pub relays_pruned: u64,
    /// Join requests accepted
    pub joins_accepted: u64,
    /// Join requests rejected
    pub joins_rejected: u64,
}

/// Per-node relay mesh state.
#[derive(Debug)]
pub struct TopologyManager {
    config: RelayConfig,
    id: NodeId,
    address: SocketAddr,
    public: bool,
    estimator: CoordinateEstimator,
    directory: RelayDirectory,
    clients: BTreeMap<NodeId, RelayRecord>,
    state: JoinState,
    current_relay: Option<NodeId>,
    contact_relay: Option<NodeId>,
    pending: HashMap<NodeId, Timestamp>,
    ping_rounds: u32,
    timeout_ping: Timestamp,
    timeout_query: Timestamp,
    timeout_join: Timestamp,
    registered: bool,
    rng: StdRng,
    stats: TopologyStats,
}

impl TopologyManager {
    /// Creates a manager for the node described by `ctx`.
    ///
    /// With `physical` set the node starts with that coordinate pinned;
    /// otherwise it starts from a random coordinate and has to converge.
    pub fn new(config: RelayConfig, ctx: &dyn NetworkContext, physical: Option<Coord>) -> Self {
        let id = ctx.local_id();
        let mut rng = StdRng::seed_from_u64(id.raw());
        let params = VivaldiParams::from(&config);

        let estimator = match physical {
            Some(coord) => CoordinateEstimator::pinned(params, coord, config.default_error),
            None => CoordinateEstimator::random(params, config.default_error, &mut rng),
        };

        debug!(
            node = %id,
            coord = %estimator.estimate().coord,
            public = ctx.is_public(),
            as_relay = config.as_relay,
            "topology manager created"
        );

        Self {
            id,
            address: ctx.local_address(),
            public: ctx.is_public(),
            estimator,
            directory: RelayDirectory::new(id),
            clients: BTreeMap::new(),
            state: JoinState::Absent,
            current_relay: None,
            contact_relay: None,
            pending: HashMap::new(),
            ping_rounds: 0,
            timeout_ping: 0,
            timeout_query: 0,
            timeout_join: 0,
            registered: false,
            rng,
            stats: TopologyStats::default(),
            config,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn state(&self) -> JoinState {
        self.state
    }

    /// Whether the node has a physical coordinate and is attached to a relay.
    pub fn is_joined(&self) -> bool {
        self.state == JoinState::Joined
            && self.current_relay.is_some()
            && self.estimator.physical_coordinate().is_some()
    }

    /// A node acts as a relay only if it is willing to and publicly reachable.
    pub fn is_relay(&self) -> bool {
        self.config.as_relay && self.public
    }

    pub fn is_bootstrap(&self) -> bool {
        self.config.bootstrap_id == Some(self.id)
    }

    /// The relay serving this node. Equals the node's own id when it is its
    /// own relay.
    pub fn current_relay(&self) -> Option<NodeId> {
        self.current_relay
    }

    /// The committed physical coordinate, once determined.
    pub fn physical_coordinate(&self) -> Option<Coord> {
        self.estimator.physical_coordinate()
    }

    /// The working coordinate estimate.
    pub fn estimate(&self) -> PhysicalEstimate {
        self.estimator.estimate()
    }

    /// Position used for distance comparisons: the committed coordinate if
    /// there is one, otherwise the working estimate.
    pub fn position(&self) -> Coord {
        self.estimator
            .physical_coordinate()
            .unwrap_or(self.estimator.estimate().coord)
    }

    pub fn directory(&self) -> &RelayDirectory {
        &self.directory
    }

    /// Clients this node has accepted as a relay.
    pub fn clients(&self) -> impl Iterator<Item = &RelayRecord> {
        self.clients.values()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn stats(&self) -> &TopologyStats {
        &self.stats
    }

    /// Number of outstanding probes.
    pub fn pending_pings(&self) -> usize {
        self.pending.len()
    }

    /// Probe rounds issued since the coordinate was last committed.
    pub fn ping_rounds(&self) -> u32 {
        self.ping_rounds
    }

    /// What this node advertises about itself.
    pub fn self_record(&self) -> RelayRecord {
        let estimate = PhysicalEstimate::new(self.position(), self.estimator.estimate().error);
        RelayRecord::new(self.id, estimate, self.address)
    }
}
