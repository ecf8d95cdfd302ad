//! # Spatial Neighbor Engine
//!
//! Answers visibility, adjacency, boundary and overlap questions over the
//! sites a node tracks.
//!
//! A single `invalidated` flag gates the tessellation: every mutation sets
//! it, every derived query rebuilds first if it is set. The tessellation is
//! therefore either fresh or explicitly stale, never out of step with the
//! site set. Moves are not applied incrementally; each one costs a full
//! rebuild on the next query.

use crate::config::NeighborConfig;
use crate::error::NeighborError;
use crate::geometry::polygon_edges;
use crate::site_set::SiteSet;
use crate::tessellation::Tessellation;
use tracing::{debug, trace};
use vast_types::{Coord, NodeId};

/// Rebuild bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TessellationStats {
    /// Tessellations built
    pub rebuilds: u64,
    /// Queries that needed the tessellation
    pub queries: u64,
    /// Calls that changed the site set
    pub mutations: u64,
}

#[derive(Debug, Clone, Default)]
pub struct SpatialNeighborEngine {
    config: NeighborConfig,
    sites: SiteSet,
    tessellation: Tessellation,
    invalidated: bool,
    stats: TessellationStats,
}

impl SpatialNeighborEngine {
    pub fn new(config: NeighborConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &NeighborConfig {
        &self.config
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Adds a site. A second insert for an id already present is ignored
    /// and returns `Ok(false)`; use [`update`](Self::update) to move a site.
    pub fn insert(&mut self, id: NodeId, position: Coord) -> Result<bool, NeighborError> {
        let added = self.sites.insert(id, position)?;
        if added {
            self.invalidate();
        } else {
            trace!(site = %id, "insert ignored, site already tracked");
        }
        Ok(added)
    }

    /// Removes a site. Returns whether it was present.
    pub fn remove(&mut self, id: NodeId) -> bool {
        let removed = self.sites.remove(id).is_some();
        if removed {
            self.invalidate();
        }
        removed
    }

    /// Moves an existing site.
    pub fn update(&mut self, id: NodeId, position: Coord) -> Result<(), NeighborError> {
        self.sites.update(id, position)?;
        self.invalidate();
        Ok(())
    }

    pub fn clear(&mut self) {
        if !self.sites.is_empty() {
            self.sites.clear();
            self.invalidate();
        }
    }

    fn invalidate(&mut self) {
        self.invalidated = true;
        self.stats.mutations += 1;
    }

    /// The current tessellation, rebuilt first if the site set changed.
    pub fn tessellation(&mut self) -> &Tessellation {
        self.stats.queries += 1;
        if self.invalidated {
            self.tessellation = Tessellation::build(&self.sites);
            self.invalidated = false;
            self.stats.rebuilds += 1;
        }
        &self.tessellation
    }

    /// Whether the next derived query has to rebuild.
    pub fn is_stale(&self) -> bool {
        self.invalidated
    }

    // ========================================================================
    // Site Set Access
    // ========================================================================

    pub fn get(&self, id: NodeId) -> Option<Coord> {
        self.sites.get(id)
    }

    pub fn has_site(&self, id: NodeId) -> bool {
        self.sites.contains_id(id)
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.sites.ids()
    }

    pub fn stats(&self) -> &TessellationStats {
        &self.stats
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Whether `point` lies in the cell of `id`. False for unknown ids.
    pub fn contains(&mut self, id: NodeId, point: Coord) -> bool {
        if !self.sites.contains_id(id) {
            return false;
        }
        self.tessellation().contains(id, point)
    }

    /// Whether the AOI circle around `center` is not fully enclosed by the
    /// cell of `id`, meaning new neighbors may soon become relevant.
    pub fn is_boundary(&mut self, id: NodeId, center: Coord, radius: f64) -> bool {
        if !self.sites.contains_id(id) {
            return false;
        }
        !self.tessellation().encloses(id, center, radius)
    }

    /// Whether the cells of `a` and `b` share an edge.
    pub fn is_enclosing(&mut self, a: NodeId, b: NodeId) -> bool {
        if a == b || !self.sites.contains_id(a) || !self.sites.contains_id(b) {
            return false;
        }
        self.tessellation().are_neighbors(a, b)
    }

    /// Enclosing neighbors of `id` out to `levels` rings.
    ///
    /// Each ring beyond the first is found by removing everything found so
    /// far and rebuilding; removed sites are put back before returning.
    ///
    /// # Arguments
    ///
    /// * `id` - Site whose neighborhood is listed
    /// * `levels` - Number of rings; `1` gives the direct Delaunay neighbors
    ///
    /// # Returns
    ///
    /// Rings nearest first, ascending by id within a ring. Empty for unknown
    /// ids or `levels == 0`. Expansion stops early once a ring comes back empty.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use vast_types::{Coord, NodeId};
    /// use vast_voronoi::{NeighborConfig, SpatialNeighborEngine};
    ///
    /// let mut engine = SpatialNeighborEngine::new(NeighborConfig::default());
    /// let points = [(0.0, 0.0), (10.0, 0.0), (-10.0, 0.0), (0.0, 10.0), (0.0, -10.0)];
    /// for (i, (x, y)) in points.into_iter().enumerate() {
    ///     engine.insert(NodeId::new(i as u64 + 1), Coord::new(x, y)).unwrap();
    /// }
    ///
    /// let ring: Vec<u64> = engine
    ///     .enclosing_neighbors(NodeId::new(1), 2)
    ///     .into_iter()
    ///     .map(NodeId::raw)
    ///     .collect();
    /// assert_eq!(ring, vec![2, 3, 4, 5]);
    /// assert_eq!(engine.len(), 5);
    /// ```
    pub fn enclosing_neighbors(&mut self, id: NodeId, levels: usize) -> Vec<NodeId> {
        if !self.sites.contains_id(id) {
            return Vec::new();
        }

        let mut found: Vec<NodeId> = Vec::new();
        let mut removed: Vec<(NodeId, Coord)> = Vec::new();
        let mut cursor = 0;

        for _ in 0..levels {
            for &neighbor in &found[cursor..] {
                if let Some(position) = self.sites.remove(neighbor) {
                    removed.push((neighbor, position));
                    self.invalidate();
                }
            }
            cursor = found.len();

            let ring: Vec<NodeId> = self.tessellation().neighbors(id).collect();
            if ring.is_empty() {
                break;
            }
            found.extend(ring);
        }

        if !removed.is_empty() {
            debug!(site = %id, levels, restored = removed.len(), "restoring sites after ring expansion");
            for (neighbor, position) in removed {
                self.sites.restore(neighbor, position);
                self.invalidate();
            }
        }
        found
    }

    /// Whether the circle around `center` overlaps the region of `id`.
    ///
    /// The fast path compares the distance from `center` to the site with
    /// `radius`. The precise path tests the circle against the site's cell;
    /// the two agree except near the edge of the circle. The circle is used
    /// exactly as given.
    ///
    /// # Arguments
    ///
    /// * `id` - Site whose region is tested
    /// * `center` - Center of the circle
    /// * `radius` - Radius of the circle
    /// * `precise` - Test against the cell instead of the site position
    ///
    /// # Returns
    ///
    /// `false` for unknown ids. If the cell cannot be closed into a polygon
    /// the precise path falls back to the distance comparison.
    pub fn overlaps(&mut self, id: NodeId, center: Coord, radius: f64, precise: bool) -> bool {
        let Some(site) = self.sites.get(id) else {
            return false;
        };
        let within = site.distance(center) <= radius;
        if !precise {
            return within;
        }

        let margin = self.config.bounds_margin;
        let tessellation = self.tessellation();
        tessellation
            .bounds(margin)
            .and_then(|bounds| tessellation.collides(id, center, radius, bounds))
            .unwrap_or(within)
    }

    /// AOI overlap using the configured precision, with the AOI grown by
    /// `overlap_buffer`.
    pub fn overlaps_aoi(&mut self, id: NodeId, center: Coord, radius: f64) -> bool {
        let precise = self.config.precise_overlap;
        let buffered = radius + self.config.overlap_buffer;
        self.overlaps(id, center, buffered, precise)
    }

    /// The tracked site nearest to `point`. Ties go to the smaller id.
    pub fn closest_to(&self, point: Coord) -> Result<NodeId, NeighborError> {
        self.sites.closest_to(point)
    }

    /// Edges of the cell of `id`, with unbounded cells closed off by a box
    /// `bounds_margin` around all sites. Empty for unknown ids.
    pub fn edges(&mut self, id: NodeId) -> Vec<(Coord, Coord)> {
        if !self.sites.contains_id(id) {
            return Vec::new();
        }
        let margin = self.config.bounds_margin;
        let tessellation = self.tessellation();
        match tessellation.bounds(margin) {
            Some(bounds) => polygon_edges(&tessellation.cell(id, bounds)),
            None => Vec::new(),
        }
    }
}
