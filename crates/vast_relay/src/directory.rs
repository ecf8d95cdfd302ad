//! The relay directory: every relay a node currently knows about.

use rand::seq::IteratorRandom;
use rand::Rng;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use vast_types::{Coord, NodeId, RelayRecord, Timestamp};

/// Orders two `(distance, id)` candidates: smaller distance first, then
/// smaller id. Distances are compared exactly.
pub fn closer(a: (f64, NodeId), b: (f64, NodeId)) -> Ordering {
    a.0.total_cmp(&b.0).then(a.1.cmp(&b.1))
}

/// Known relays keyed by id.
///
/// The local node never appears in its own directory, so every lookup that
/// wants to consider "self" as a candidate passes it in explicitly.
#[derive(Debug, Clone)]
pub struct RelayDirectory {
    local_id: NodeId,
    relays: BTreeMap<NodeId, RelayRecord>,
}

impl RelayDirectory {
    pub fn new(local_id: NodeId) -> Self {
        Self {
            local_id,
            relays: BTreeMap::new(),
        }
    }

    /// Inserts or refreshes a record, stamping it with `now`.
    ///
    /// Returns `true` when the relay was not known before. Records describing
    /// the local node are ignored.
    pub fn upsert(&mut self, mut record: RelayRecord, now: Timestamp) -> bool {
        if record.id == self.local_id {
            return false;
        }
        record.last_seen = now;
        self.relays.insert(record.id, record).is_none()
    }

    pub fn remove(&mut self, id: NodeId) -> Option<RelayRecord> {
        self.relays.remove(&id)
    }

    pub fn get(&self, id: NodeId) -> Option<&RelayRecord> {
        self.relays.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.relays.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.relays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RelayRecord> {
        self.relays.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.relays.keys().copied()
    }

    /// All records sorted by distance from `origin`, nearest first.
    pub fn sorted_by_distance(&self, origin: Coord) -> Vec<&RelayRecord> {
        let mut records: Vec<&RelayRecord> = self.relays.values().collect();
        records.sort_by(|a, b| {
            closer(
                (a.coord().distance(origin), a.id),
                (b.coord().distance(origin), b.id),
            )
        });
        records
    }

    /// The candidate closest to `target` among the directory and, if given,
    /// the local node itself.
    pub fn closest_to(&self, target: Coord, local: Option<(NodeId, Coord)>) -> Option<NodeId> {
        let known = self
            .relays
            .values()
            .map(|record| (record.coord().distance(target), record.id));
        let local = local.map(|(id, coord)| (coord.distance(target), id));

        known
            .chain(local)
            .min_by(|a, b| closer(*a, *b))
            .map(|(_, id)| id)
    }

    /// The next relay to try after `previous`, in distance order from
    /// `origin`, wrapping around to the nearest once the list is exhausted.
    ///
    /// With no previous contact (or one no longer known) the nearest relay is
    /// returned.
    pub fn next_after(&self, previous: Option<NodeId>, origin: Coord) -> Option<NodeId> {
        let sorted = self.sorted_by_distance(origin);
        let first = sorted.first().map(|record| record.id)?;

        let Some(previous) = previous else {
            return Some(first);
        };

        let position = sorted.iter().position(|record| record.id == previous);
        match position {
            Some(index) => Some(
                sorted
                    .get(index + 1)
                    .map(|record| record.id)
                    .unwrap_or(first),
            ),
            None => Some(first),
        }
    }

    /// Up to `count` records chosen uniformly at random.
    pub fn random_subset<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> Vec<RelayRecord> {
        self.relays
            .values()
            .cloned()
            .choose_multiple(rng, count)
    }

    /// Ids of the records that would have to go for the directory to shrink to
    /// `limit`, farthest from `origin` first. Ids in `keep` are never chosen.
    pub fn excess_by_distance(&self, origin: Coord, limit: usize, keep: &[NodeId]) -> Vec<NodeId> {
        if self.relays.len() <= limit {
            return Vec::new();
        }

        let excess = self.relays.len() - limit;
        self.sorted_by_distance(origin)
            .into_iter()
            .rev()
            .map(|record| record.id)
            .filter(|id| !keep.contains(id))
            .take(excess)
            .collect()
    }

    pub fn clear(&mut self) {
        self.relays.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use vast_types::PhysicalEstimate;

    fn record(id: u64, x: f64, y: f64) -> RelayRecord {
        RelayRecord::new(
            NodeId::new(id),
            PhysicalEstimate::new(Coord::new(x, y), 0.1),
            format!("10.0.0.{id}:3737").parse().expect("valid address"),
        )
    }

    fn directory() -> RelayDirectory {
        let mut dir = RelayDirectory::new(NodeId::new(100));
        dir.upsert(record(1, 0.0, 0.0), 1);
        dir.upsert(record(2, 10.0, 0.0), 1);
        dir.upsert(record(3, 0.0, 30.0), 1);
        dir
    }

    #[test]
    fn upsert_ignores_self_and_stamps_time() {
        let mut dir = RelayDirectory::new(NodeId::new(100));
        assert!(!dir.upsert(record(100, 0.0, 0.0), 5));
        assert!(dir.is_empty());

        assert!(dir.upsert(record(1, 1.0, 1.0), 5));
        assert!(!dir.upsert(record(1, 2.0, 2.0), 9));
        let stored = dir.get(NodeId::new(1)).expect("record stored");
        assert_eq!(stored.last_seen, 9);
        assert_eq!(stored.coord(), Coord::new(2.0, 2.0));
    }

    #[test]
    fn closest_breaks_ties_by_smaller_id() {
        let mut dir = RelayDirectory::new(NodeId::new(100));
        dir.upsert(record(7, 5.0, 0.0), 0);
        dir.upsert(record(4, -5.0, 0.0), 0);

        assert_eq!(dir.closest_to(Coord::zero(), None), Some(NodeId::new(4)));

        // The local node joins the tie with an even smaller id.
        let local = Some((NodeId::new(2), Coord::new(0.0, 5.0)));
        assert_eq!(dir.closest_to(Coord::zero(), local), Some(NodeId::new(2)));
    }

    #[test]
    fn closest_considers_local_node() {
        let dir = directory();
        let local = Some((NodeId::new(100), Coord::new(0.0, 20.0)));
        assert_eq!(dir.closest_to(Coord::new(0.0, 22.0), local), Some(NodeId::new(100)));
        assert_eq!(dir.closest_to(Coord::new(9.0, 1.0), local), Some(NodeId::new(2)));
        assert_eq!(RelayDirectory::new(NodeId::new(1)).closest_to(Coord::zero(), None), None);
    }

    #[test]
    fn next_after_walks_distance_order_and_wraps() {
        let dir = directory();
        let origin = Coord::new(1.0, 0.0);

        assert_eq!(dir.next_after(None, origin), Some(NodeId::new(1)));
        assert_eq!(dir.next_after(Some(NodeId::new(1)), origin), Some(NodeId::new(2)));
        assert_eq!(dir.next_after(Some(NodeId::new(2)), origin), Some(NodeId::new(3)));
        assert_eq!(dir.next_after(Some(NodeId::new(3)), origin), Some(NodeId::new(1)));
        assert_eq!(dir.next_after(Some(NodeId::new(55)), origin), Some(NodeId::new(1)));
    }

    #[test]
    fn random_subset_is_bounded() {
        let dir = directory();
        let mut rng = StdRng::seed_from_u64(3);

        assert_eq!(dir.random_subset(2, &mut rng).len(), 2);
        assert_eq!(dir.random_subset(10, &mut rng).len(), 3);
        assert!(dir.random_subset(0, &mut rng).is_empty());
    }

    #[test]
    fn excess_picks_farthest_and_respects_keep() {
        let dir = directory();
        let origin = Coord::zero();

        assert!(dir.excess_by_distance(origin, 3, &[]).is_empty());
        assert_eq!(dir.excess_by_distance(origin, 2, &[]), vec![NodeId::new(3)]);
        assert_eq!(
            dir.excess_by_distance(origin, 1, &[NodeId::new(3)]),
            vec![NodeId::new(2), NodeId::new(1)]
        );
    }
}
