//! # VAST Spatial Neighbor Engine
//!
//! Point-location and proximity-topology queries over a dynamic set of 2D
//! positions, backed by a Voronoi tessellation that is rebuilt lazily after
//! the set changes.
//!
//! ## Example
//!
//! ```rust
//! use vast_types::{Coord, NodeId};
//! use vast_voronoi::{NeighborConfig, SpatialNeighborEngine};
//!
//! let mut engine = SpatialNeighborEngine::new(NeighborConfig::default());
//! engine.insert(NodeId::new(1), Coord::new(0.0, 0.0)).unwrap();
//! engine.insert(NodeId::new(2), Coord::new(10.0, 0.0)).unwrap();
//! engine.insert(NodeId::new(3), Coord::new(100.0, 100.0)).unwrap();
//!
//! assert_eq!(engine.closest_to(Coord::new(5.0, 5.0)).unwrap(), NodeId::new(1));
//! assert!(engine.is_enclosing(NodeId::new(1), NodeId::new(3)));
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod site_set;
pub mod tessellation;

pub use config::NeighborConfig;
pub use engine::{SpatialNeighborEngine, TessellationStats};
pub use error::NeighborError;
pub use site_set::SiteSet;
pub use tessellation::Tessellation;
