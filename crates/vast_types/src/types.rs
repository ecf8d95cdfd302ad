//! # Core Type Definitions
//!
//! The fundamental types shared by the relay mesh and the spatial neighbor engine.
//!
//! ## Key Types
//!
//! - [`NodeId`] - Totally ordered identifier of an overlay node
//! - [`Coord`] - 2D float position, used both for network coordinates and AOI centers
//! - [`PhysicalEstimate`] - A synthetic network coordinate together with its error
//! - [`RelayRecord`] - What a node knows about a relay it has heard of
//!
//! All types are serializable so they can travel inside protocol messages.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::ops::{Add, AddAssign, Mul, Sub};

// ============================================================================
// Identifiers & Time
// ============================================================================

/// Logical clock reading. Every node advances its own clock; only differences
/// between two readings of the same clock are meaningful.
pub type Timestamp = u64;

/// Unique identifier for a node in the overlay.
///
/// Identifiers are totally ordered. The ordering is used wherever two
/// candidates are otherwise indistinguishable (equal distance during greedy
/// relay lookup), so every node breaks ties the same way.
///
/// # Examples
///
/// ```rust
/// use vast_types::NodeId;
///
/// let a = NodeId::new(3);
/// let b = NodeId::new(7);
/// assert!(a < b);
/// assert_eq!(a.to_string(), "3");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Creates an identifier from its raw value.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

// ============================================================================
// Geometry
// ============================================================================

/// A 2D position with double precision.
///
/// Supports the vector arithmetic the coordinate estimator and the Voronoi
/// queries need: add, subtract, scale, distance and unit normalization.
///
/// # Examples
///
/// ```rust
/// use vast_types::Coord;
///
/// let a = Coord::new(0.0, 0.0);
/// let b = Coord::new(3.0, 4.0);
/// assert_eq!(a.distance(b), 5.0);
/// assert_eq!((b - a).unit(), Coord::new(0.6, 0.8));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coord {
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
}

impl Coord {
    /// Creates a new coordinate.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// The origin (0, 0).
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Euclidean distance to another coordinate.
    pub fn distance(&self, other: Coord) -> f64 {
        (*self - other).length()
    }

    /// Squared Euclidean distance, for comparisons that do not need the root.
    pub fn distance_squared(&self, other: Coord) -> f64 {
        let d = *self - other;
        d.dot(d)
    }

    /// Length of the vector from the origin to this coordinate.
    pub fn length(&self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Dot product.
    pub fn dot(&self, other: Coord) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// Returns the unit vector pointing the same way.
    ///
    /// A zero-length vector has no direction and is returned unchanged.
    pub fn unit(&self) -> Coord {
        let len = self.length();
        if len == 0.0 {
            *self
        } else {
            Coord::new(self.x / len, self.y / len)
        }
    }

    /// A unit vector with a uniformly random direction.
    pub fn random_unit<R: Rng + ?Sized>(rng: &mut R) -> Coord {
        let angle = rng.gen_range(0.0..std::f64::consts::TAU);
        Coord::new(angle.cos(), angle.sin())
    }

    /// Whether both components are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Coord {
    type Output = Coord;

    fn add(self, rhs: Coord) -> Coord {
        Coord::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Coord {
    fn add_assign(&mut self, rhs: Coord) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Coord {
    type Output = Coord;

    fn sub(self, rhs: Coord) -> Coord {
        Coord::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Coord {
    type Output = Coord;

    fn mul(self, rhs: f64) -> Coord {
        Coord::new(self.x * rhs, self.y * rhs)
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3})", self.x, self.y)
    }
}

// ============================================================================
// Overlay Records
// ============================================================================

/// A synthetic network coordinate and the confidence in it.
///
/// A node owns its own estimate exclusively; copies of remote estimates are
/// cached by value inside [`RelayRecord`]s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicalEstimate {
    /// Position in coordinate space; distances approximate round-trip latency
    pub coord: Coord,
    /// Relative error of the estimate, never negative
    pub error: f64,
}

impl PhysicalEstimate {
    /// Creates an estimate, clamping a negative error to zero.
    pub fn new(coord: Coord, error: f64) -> Self {
        Self {
            coord,
            error: error.max(0.0),
        }
    }
}

/// Everything a node caches about a known relay.
///
/// Created on first contact (a PONG or a gossiped relay list), refreshed on
/// later PONGs, and dropped on disconnect, RTT anomaly, a bad-landmark report
/// or capacity cleanup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayRecord {
    /// Relay identifier
    pub id: NodeId,
    /// Last known physical estimate of the relay
    pub estimate: PhysicalEstimate,
    /// Transport address used to reach the relay
    pub address: SocketAddr,
    /// Local clock reading when the record was last refreshed
    #[serde(default)]
    pub last_seen: Timestamp,
}

impl RelayRecord {
    /// Creates a record that has never been refreshed.
    pub fn new(id: NodeId, estimate: PhysicalEstimate, address: SocketAddr) -> Self {
        Self {
            id,
            estimate,
            address,
            last_seen: 0,
        }
    }

    /// Shortcut for the cached coordinate.
    pub fn coord(&self) -> Coord {
        self.estimate.coord
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn coord_arithmetic() {
        let a = Coord::new(1.0, 2.0);
        let b = Coord::new(4.0, 6.0);

        assert_eq!(a + b, Coord::new(5.0, 8.0));
        assert_eq!(b - a, Coord::new(3.0, 4.0));
        assert_eq!(a * 2.0, Coord::new(2.0, 4.0));
        assert_eq!(a.distance(b), 5.0);
        assert_eq!(a.distance_squared(b), 25.0);

        let mut c = a;
        c += b;
        assert_eq!(c, Coord::new(5.0, 8.0));
    }

    #[test]
    fn unit_of_zero_vector_is_zero() {
        assert_eq!(Coord::zero().unit(), Coord::zero());
        let u = Coord::new(10.0, 0.0).unit();
        assert_eq!(u, Coord::new(1.0, 0.0));
    }

    #[test]
    fn random_unit_has_length_one() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..32 {
            let u = Coord::random_unit(&mut rng);
            assert!((u.length() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn node_ids_are_ordered() {
        let mut ids = vec![NodeId::new(9), NodeId::new(2), NodeId::new(5)];
        ids.sort();
        assert_eq!(ids, vec![NodeId::new(2), NodeId::new(5), NodeId::new(9)]);
    }

    #[test]
    fn negative_error_is_clamped() {
        let est = PhysicalEstimate::new(Coord::zero(), -0.5);
        assert_eq!(est.error, 0.0);
    }

    #[test]
    fn relay_record_serializes() {
        let record = RelayRecord::new(
            NodeId::new(4),
            PhysicalEstimate::new(Coord::new(1.5, -2.0), 0.25),
            "127.0.0.1:4000".parse().expect("valid address"),
        );
        let json = serde_json::to_string(&record).expect("serialize");
        let back: RelayRecord = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, record);
    }
}
