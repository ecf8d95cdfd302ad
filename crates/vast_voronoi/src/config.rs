//! Spatial neighbor engine configuration.

use serde::{Deserialize, Serialize};

fn default_overlap_buffer() -> f64 { 5.0 }
fn default_bounds_margin() -> f64 { 100.0 }

/// Tunables for [`SpatialNeighborEngine`](crate::SpatialNeighborEngine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborConfig {
    /// Use the circle/cell intersection test in [`overlaps_aoi`](crate::SpatialNeighborEngine::overlaps_aoi)
    /// instead of the plain distance comparison
    #[serde(default)]
    pub precise_overlap: bool,
    /// Extra radius added to the AOI by `overlaps_aoi`
    #[serde(default = "default_overlap_buffer")]
    pub overlap_buffer: f64,
    /// Margin around the sites' bounding box used to close unbounded cells
    #[serde(default = "default_bounds_margin")]
    pub bounds_margin: f64,
}

impl Default for NeighborConfig {
    fn default() -> Self {
        Self {
            precise_overlap: false,
            overlap_buffer: default_overlap_buffer(),
            bounds_margin: default_bounds_margin(),
        }
    }
}
