//! # VAST Relay Mesh
//!
//! Gives every node of the overlay a synthetic network coordinate and a live
//! connection to its nearest known relay, using only transient contact with
//! nodes that already joined.
//!
//! ## Components
//!
//! * [`CoordinateEstimator`] - Vivaldi coordinate synthesis from round-trip samples
//! * [`RelayDirectory`] - the relays a node knows, ordered for greedy lookup
//! * [`TopologyManager`] - join state machine, probing, greedy nearest-relay
//!   query and directory maintenance
//! * [`NetworkContext`] - the seam to whatever transport carries [`RelayMessage`]s
//! * [`MemoryNetwork`] / [`LocalMesh`] - an in-process transport for running
//!   many nodes in one process
//!
//! ## Example
//!
//! ```rust
//! use vast_relay::{EntryPoint, LocalMesh, MemoryNetwork, RelayConfig};
//! use vast_types::NodeId;
//!
//! let bootstrap = NodeId::new(1);
//! let config = RelayConfig {
//!     bootstrap_id: Some(bootstrap),
//!     entry_points: vec![EntryPoint {
//!         id: bootstrap,
//!         address: MemoryNetwork::address_for(bootstrap),
//!     }],
//!     ..RelayConfig::default()
//! };
//!
//! let mut mesh = LocalMesh::new(MemoryNetwork::with_constant_latency(5));
//! mesh.spawn(bootstrap, true, config.clone(), None);
//! mesh.spawn(NodeId::new(2), false, config, None);
//!
//! assert!(mesh.run_until(10, 60_000, |mesh| mesh.all_joined()));
//! ```

pub mod config;
pub mod context;
pub mod coordinate;
pub mod directory;
pub mod error;
pub mod manager;
pub mod memory;
pub mod mesh;
pub mod message;

pub use config::{EntryPoint, RelayConfig};
pub use context::NetworkContext;
pub use coordinate::{vivaldi_step, CoordinateEstimator, VivaldiParams};
pub use directory::RelayDirectory;
pub use error::{ConfigError, RelayError, TransportError};
pub use manager::{JoinState, TopologyManager, TopologyStats};
pub use memory::{Endpoint, MemoryNetwork, NetworkStats};
pub use mesh::LocalMesh;
pub use message::{Contact, Envelope, RelayMessage};
