//! Error types for the spatial neighbor engine.
//!
//! Queries about unknown sites answer `false` or an empty list. Only calls
//! that cannot produce a meaningful answer at all return an error.

use vast_types::{Coord, NodeId};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NeighborError {
    /// The id is not part of the site set
    #[error("site {0} is not tracked")]
    UnknownSite(NodeId),

    /// A query that needs at least one site was made against an empty set
    #[error("site set is empty")]
    EmptySiteSet,

    /// The position cannot be placed in the plane (NaN, infinite, or a
    /// magnitude outside the triangulation's range)
    #[error("invalid position {position} for site {id}")]
    InvalidPosition { id: NodeId, position: Coord },
}
