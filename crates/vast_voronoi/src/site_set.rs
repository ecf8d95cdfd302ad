//! The dynamic set of (id, position) pairs a node tracks.

use crate::error::NeighborError;
use spade::validate_coordinate;
use std::collections::BTreeMap;
use vast_types::{Coord, NodeId};

/// Sites keyed by id. Ids are unique; iteration is in ascending id order.
#[derive(Debug, Clone, Default)]
pub struct SiteSet {
    sites: BTreeMap<NodeId, Coord>,
}

/// Accepts only positions the triangulation can hold: finite, and with each
/// nonzero component inside spade's magnitude range.
fn check_position(id: NodeId, position: Coord) -> Result<(), NeighborError> {
    let placeable = position.is_finite()
        && validate_coordinate(position.x).is_ok()
        && validate_coordinate(position.y).is_ok();
    if placeable {
        Ok(())
    } else {
        Err(NeighborError::InvalidPosition { id, position })
    }
}

impl SiteSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a site. Returns `Ok(false)` without touching the stored position
    /// when `id` is already present.
    pub fn insert(&mut self, id: NodeId, position: Coord) -> Result<bool, NeighborError> {
        check_position(id, position)?;
        if self.sites.contains_key(&id) {
            return Ok(false);
        }
        self.sites.insert(id, position);
        Ok(true)
    }

    pub fn remove(&mut self, id: NodeId) -> Option<Coord> {
        self.sites.remove(&id)
    }

    /// Moves an existing site.
    pub fn update(&mut self, id: NodeId, position: Coord) -> Result<(), NeighborError> {
        check_position(id, position)?;
        let site = self
            .sites
            .get_mut(&id)
            .ok_or(NeighborError::UnknownSite(id))?;
        *site = position;
        Ok(())
    }

    /// Puts back a site taken out with [`remove`](Self::remove).
    pub(crate) fn restore(&mut self, id: NodeId, position: Coord) {
        self.sites.entry(id).or_insert(position);
    }

    pub fn get(&self, id: NodeId) -> Option<Coord> {
        self.sites.get(&id).copied()
    }

    pub fn contains_id(&self, id: NodeId) -> bool {
        self.sites.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, Coord)> + '_ {
        self.sites.iter().map(|(id, pos)| (*id, *pos))
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.sites.keys().copied()
    }

    pub fn clear(&mut self) {
        self.sites.clear();
    }

    /// The site nearest to `point` by linear scan. Equidistant sites resolve
    /// to the smaller id.
    pub fn closest_to(&self, point: Coord) -> Result<NodeId, NeighborError> {
        let mut best: Option<(NodeId, f64)> = None;
        for (id, position) in self.iter() {
            let d = point.distance_squared(position);
            if best.map_or(true, |(_, min)| d < min) {
                best = Some((id, d));
            }
        }
        best.map(|(id, _)| id).ok_or(NeighborError::EmptySiteSet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u64) -> NodeId {
        NodeId::new(raw)
    }

    #[test]
    fn insert_keeps_first_position() {
        let mut sites = SiteSet::new();
        assert_eq!(sites.insert(id(1), Coord::new(1.0, 1.0)), Ok(true));
        assert_eq!(sites.insert(id(1), Coord::new(9.0, 9.0)), Ok(false));
        assert_eq!(sites.len(), 1);
        assert_eq!(sites.get(id(1)), Some(Coord::new(1.0, 1.0)));
    }

    #[test]
    fn rejects_non_finite_positions() {
        let mut sites = SiteSet::new();
        let bad = Coord::new(f64::NAN, 0.0);
        assert!(matches!(
            sites.insert(id(1), bad),
            Err(NeighborError::InvalidPosition { .. })
        ));
        sites.insert(id(1), Coord::zero()).expect("finite");
        assert!(sites.update(id(1), Coord::new(0.0, f64::INFINITY)).is_err());
        assert_eq!(sites.get(id(1)), Some(Coord::zero()));
    }

    #[test]
    fn rejects_positions_the_triangulation_cannot_hold() {
        let mut sites = SiteSet::new();
        for bad in [Coord::new(1e-50, 5.0), Coord::new(1e300, 0.0), Coord::new(0.0, -1e300)] {
            assert_eq!(
                sites.insert(id(3), bad),
                Err(NeighborError::InvalidPosition { id: id(3), position: bad })
            );
        }
        assert!(sites.is_empty());

        // Exact zero is fine, tiny but nonzero is not.
        sites.insert(id(1), Coord::new(0.0, 1e-3)).expect("placeable");
        assert!(sites.update(id(1), Coord::new(1e-50, 0.0)).is_err());
        assert_eq!(sites.get(id(1)), Some(Coord::new(0.0, 1e-3)));
    }

    #[test]
    fn update_requires_known_site() {
        let mut sites = SiteSet::new();
        assert_eq!(
            sites.update(id(4), Coord::zero()),
            Err(NeighborError::UnknownSite(id(4)))
        );
    }

    #[test]
    fn closest_breaks_ties_by_id() {
        let mut sites = SiteSet::new();
        assert_eq!(sites.closest_to(Coord::zero()), Err(NeighborError::EmptySiteSet));

        sites.insert(id(9), Coord::new(-1.0, 0.0)).expect("finite");
        sites.insert(id(3), Coord::new(1.0, 0.0)).expect("finite");
        sites.insert(id(5), Coord::new(0.0, 5.0)).expect("finite");
        assert_eq!(sites.closest_to(Coord::zero()), Ok(id(3)));
        assert_eq!(sites.closest_to(Coord::new(0.0, 4.0)), Ok(id(5)));
    }
}
