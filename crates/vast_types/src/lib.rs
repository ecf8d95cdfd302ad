//! # VAST Types
//!
//! Shared data model used by both halves of the overlay:
//!
//! * `vast_relay` - relay mesh topology (network coordinates, relay directory, join protocol)
//! * `vast_voronoi` - spatial neighbor engine (sites, tessellation, AOI queries)
//!
//! See [`types`] for the individual definitions.

pub mod types;

pub use types::{Coord, NodeId, PhysicalEstimate, RelayRecord, Timestamp};
