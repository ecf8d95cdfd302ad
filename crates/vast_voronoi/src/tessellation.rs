//! The Voronoi tessellation of a [`SiteSet`] snapshot.
//!
//! Built from a Delaunay triangulation (the dual graph): two sites are
//! enclosing neighbors exactly when they share a triangulation edge, and a
//! site's cell is the intersection of the bisector half-planes against its
//! Delaunay neighbors. Sites at identical positions collapse onto one
//! triangulation vertex; they share a cell and count as neighbors of each
//! other.

use crate::geometry::{clip, polygon_edges, segment_distance, Bounds, HalfPlane};
use crate::site_set::SiteSet;
use spade::{DelaunayTriangulation, Point2, Triangulation};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{trace, warn};
use vast_types::{Coord, NodeId};

/// Slack for on-edge points in point-location tests.
pub const CONTAINS_EPSILON: f64 = 1e-6;

/// An immutable tessellation of the sites present when it was built.
#[derive(Debug, Clone, Default)]
pub struct Tessellation {
    positions: BTreeMap<NodeId, Coord>,
    neighbors: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

impl Tessellation {
    pub fn build(sites: &SiteSet) -> Self {
        let mut triangulation: DelaunayTriangulation<Point2<f64>> = DelaunayTriangulation::new();
        let mut vertex_sites: BTreeMap<usize, Vec<NodeId>> = BTreeMap::new();

        for (id, position) in sites.iter() {
            match triangulation.insert(Point2::new(position.x, position.y)) {
                Ok(handle) => vertex_sites.entry(handle.index()).or_default().push(id),
                Err(err) => warn!(site = %id, %position, ?err, "site left out of triangulation"),
            }
        }

        let mut neighbors: BTreeMap<NodeId, BTreeSet<NodeId>> =
            sites.ids().map(|id| (id, BTreeSet::new())).collect();

        for vertex in triangulation.vertices() {
            let Some(own) = vertex_sites.get(&vertex.fix().index()) else {
                continue;
            };

            let mut adjacent: BTreeSet<NodeId> = BTreeSet::new();
            for edge in vertex.out_edges() {
                if let Some(ids) = vertex_sites.get(&edge.to().fix().index()) {
                    adjacent.extend(ids.iter().copied());
                }
            }

            for id in own {
                let entry = neighbors.entry(*id).or_default();
                entry.extend(adjacent.iter().copied());
                entry.extend(own.iter().copied().filter(|other| other != id));
            }
        }

        trace!(sites = sites.len(), vertices = triangulation.num_vertices(), "tessellation built");

        Self {
            positions: sites.iter().collect(),
            neighbors,
        }
    }

    /// Number of sites the tessellation was built from.
    pub fn site_count(&self) -> usize {
        self.positions.len()
    }

    pub fn position(&self, id: NodeId) -> Option<Coord> {
        self.positions.get(&id).copied()
    }

    /// Enclosing neighbors of `id`, ascending by id. Empty for unknown ids.
    pub fn neighbors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.neighbors.get(&id).into_iter().flatten().copied()
    }

    pub fn are_neighbors(&self, a: NodeId, b: NodeId) -> bool {
        self.neighbors.get(&a).is_some_and(|set| set.contains(&b))
    }

    /// Bisector half-planes bounding the cell of `id`. Coincident neighbors
    /// contribute none.
    fn half_planes(&self, id: NodeId) -> Option<Vec<HalfPlane>> {
        let site = self.position(id)?;
        let planes = self
            .neighbors(id)
            .filter_map(|other| self.position(other))
            .filter(|other| *other != site)
            .map(|other| HalfPlane::bisector(site, other))
            .collect();
        Some(planes)
    }

    /// Whether `point` lies in the cell of `id` (boundary included).
    pub fn contains(&self, id: NodeId, point: Coord) -> bool {
        self.half_planes(id)
            .is_some_and(|planes| planes.iter().all(|plane| plane.contains(point, CONTAINS_EPSILON)))
    }

    /// Whether the circle lies entirely inside the cell of `id`.
    pub fn encloses(&self, id: NodeId, center: Coord, radius: f64) -> bool {
        self.half_planes(id).is_some_and(|planes| {
            planes
                .iter()
                .all(|plane| plane.signed_distance(center) >= radius)
        })
    }

    /// The cell of `id` as a counter-clockwise polygon, closed off by `bounds`.
    pub fn cell(&self, id: NodeId, bounds: Bounds) -> Vec<Coord> {
        let Some(planes) = self.half_planes(id) else {
            return Vec::new();
        };
        planes
            .iter()
            .fold(bounds.polygon(), |polygon, plane| clip(&polygon, plane))
    }

    /// Whether the circle intersects the cell of `id`.
    ///
    /// Returns `None` when the cell has no area inside `bounds` to test.
    pub fn collides(&self, id: NodeId, center: Coord, radius: f64, bounds: Bounds) -> Option<bool> {
        if self.contains(id, center) {
            return Some(true);
        }
        let polygon = self.cell(id, bounds.include_circle(center, radius));
        if polygon.len() < 3 {
            return None;
        }
        Some(
            polygon_edges(&polygon)
                .into_iter()
                .any(|(a, b)| segment_distance(center, a, b) <= radius),
        )
    }

    /// Bounding box of all sites grown by `margin`.
    pub fn bounds(&self, margin: f64) -> Option<Bounds> {
        Bounds::around(self.positions.values().copied(), margin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(points: &[(u64, f64, f64)]) -> Tessellation {
        let mut sites = SiteSet::new();
        for (id, x, y) in points {
            sites
                .insert(NodeId::new(*id), Coord::new(*x, *y))
                .expect("finite position");
        }
        Tessellation::build(&sites)
    }

    fn ids(tess: &Tessellation, id: u64) -> Vec<u64> {
        tess.neighbors(NodeId::new(id)).map(NodeId::raw).collect()
    }

    #[test]
    fn square_with_center_point() {
        let tess = build(&[
            (1, 0.0, 0.0),
            (2, 10.0, 0.0),
            (3, 10.0, 10.0),
            (4, 0.0, 10.0),
            (5, 5.0, 5.0),
        ]);

        assert_eq!(ids(&tess, 5), vec![1, 2, 3, 4]);
        assert!(tess.contains(NodeId::new(5), Coord::new(5.0, 5.0)));
        assert!(tess.contains(NodeId::new(5), Coord::new(2.5, 5.0)));
        assert!(!tess.contains(NodeId::new(5), Coord::new(1.0, 1.0)));
        assert!(tess.encloses(NodeId::new(5), Coord::new(5.0, 5.0), 3.0));
        assert!(!tess.encloses(NodeId::new(5), Coord::new(5.0, 5.0), 4.0));
    }

    #[test]
    fn collinear_sites_link_consecutively() {
        let tess = build(&[(1, 0.0, 0.0), (2, 10.0, 0.0), (3, 20.0, 0.0)]);
        assert_eq!(ids(&tess, 2), vec![1, 3]);
        assert_eq!(ids(&tess, 1), vec![2]);
        assert!(!tess.are_neighbors(NodeId::new(1), NodeId::new(3)));
    }

    #[test]
    fn coincident_sites_share_neighbors() {
        let tess = build(&[(1, 0.0, 0.0), (2, 0.0, 0.0), (3, 10.0, 0.0)]);
        assert_eq!(ids(&tess, 1), vec![2, 3]);
        assert_eq!(ids(&tess, 2), vec![1, 3]);
        assert_eq!(ids(&tess, 3), vec![1, 2]);
        assert!(tess.contains(NodeId::new(2), Coord::zero()));
    }

    #[test]
    fn cell_is_clipped_to_bounds() {
        let tess = build(&[(1, 0.0, 0.0), (2, 10.0, 0.0)]);
        let bounds = tess.bounds(10.0).expect("two sites");
        let cell = tess.cell(NodeId::new(1), bounds);

        assert_eq!(cell.len(), 4);
        assert!(cell.iter().all(|p| p.x <= 5.0 + 1e-9 && p.x >= -10.0));
        assert_eq!(tess.cell(NodeId::new(7), bounds), Vec::new());
    }

    #[test]
    fn collision_reaches_across_the_bisector() {
        let tess = build(&[(1, 0.0, 0.0), (2, 10.0, 0.0)]);
        let bounds = tess.bounds(10.0).expect("two sites");
        let id = NodeId::new(1);

        assert_eq!(tess.collides(id, Coord::new(8.0, 0.0), 3.5, bounds), Some(true));
        assert_eq!(tess.collides(id, Coord::new(8.0, 0.0), 2.5, bounds), Some(false));
        assert_eq!(tess.collides(id, Coord::new(-50.0, 0.0), 1.0, bounds), Some(true));
    }
}
