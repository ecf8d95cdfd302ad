//! Planar helpers for Voronoi cells: bisector half-planes, convex clipping
//! and point/segment distances.

use vast_types::Coord;

/// The closed half-plane `{ p : normal . p <= offset }`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HalfPlane {
    pub normal: Coord,
    pub offset: f64,
}

impl HalfPlane {
    /// Points at least as close to `site` as to `other`.
    ///
    /// The normal is unit length, so [`signed_distance`](Self::signed_distance)
    /// is a true Euclidean distance.
    pub fn bisector(site: Coord, other: Coord) -> Self {
        let normal = (other - site).unit();
        let midpoint = (site + other) * 0.5;
        Self {
            normal,
            offset: normal.dot(midpoint),
        }
    }

    /// Distance from `point` to the boundary line, positive inside.
    pub fn signed_distance(&self, point: Coord) -> f64 {
        self.offset - self.normal.dot(point)
    }

    pub fn contains(&self, point: Coord, epsilon: f64) -> bool {
        self.signed_distance(point) >= -epsilon
    }

    /// Where the segment `a -> b` crosses the boundary line.
    fn intersection(&self, a: Coord, b: Coord) -> Coord {
        let da = self.signed_distance(a);
        let db = self.signed_distance(b);
        let t = da / (da - db);
        a + (b - a) * t
    }
}

/// An axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Coord,
    pub max: Coord,
}

impl Bounds {
    /// The smallest box holding every point, grown by `margin` on each side.
    /// Returns `None` for an empty iterator.
    pub fn around<I>(points: I, margin: f64) -> Option<Self>
    where
        I: IntoIterator<Item = Coord>,
    {
        let mut points = points.into_iter();
        let first = points.next()?;
        let (mut min, mut max) = (first, first);
        for p in points {
            min = Coord::new(min.x.min(p.x), min.y.min(p.y));
            max = Coord::new(max.x.max(p.x), max.y.max(p.y));
        }
        let margin = Coord::new(margin, margin);
        Some(Self {
            min: min - margin,
            max: max + margin,
        })
    }

    /// Grows the box so it also holds the circle around `center`.
    pub fn include_circle(self, center: Coord, radius: f64) -> Self {
        Self {
            min: Coord::new(self.min.x.min(center.x - radius), self.min.y.min(center.y - radius)),
            max: Coord::new(self.max.x.max(center.x + radius), self.max.y.max(center.y + radius)),
        }
    }

    /// Corners in counter-clockwise order.
    pub fn polygon(&self) -> Vec<Coord> {
        vec![
            self.min,
            Coord::new(self.max.x, self.min.y),
            self.max,
            Coord::new(self.min.x, self.max.y),
        ]
    }
}

/// Clips a convex polygon against a half-plane (Sutherland-Hodgman).
pub fn clip(polygon: &[Coord], plane: &HalfPlane) -> Vec<Coord> {
    let mut out = Vec::with_capacity(polygon.len() + 1);
    for (i, &current) in polygon.iter().enumerate() {
        let next = polygon[(i + 1) % polygon.len()];
        let current_in = plane.contains(current, 0.0);
        let next_in = plane.contains(next, 0.0);

        if current_in {
            out.push(current);
        }
        if current_in != next_in {
            out.push(plane.intersection(current, next));
        }
    }
    out
}

/// Distance from `point` to the closed segment `a -> b`.
pub fn segment_distance(point: Coord, a: Coord, b: Coord) -> f64 {
    let ab = b - a;
    let len2 = ab.dot(ab);
    if len2 == 0.0 {
        return point.distance(a);
    }
    let t = ((point - a).dot(ab) / len2).clamp(0.0, 1.0);
    point.distance(a + ab * t)
}

/// Consecutive vertex pairs of a closed polygon.
pub fn polygon_edges(polygon: &[Coord]) -> Vec<(Coord, Coord)> {
    if polygon.len() < 2 {
        return Vec::new();
    }
    (0..polygon.len())
        .map(|i| (polygon[i], polygon[(i + 1) % polygon.len()]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bisector_splits_the_plane() {
        let plane = HalfPlane::bisector(Coord::zero(), Coord::new(10.0, 0.0));
        assert_eq!(plane.signed_distance(Coord::new(5.0, 3.0)), 0.0);
        assert_eq!(plane.signed_distance(Coord::new(2.0, 0.0)), 3.0);
        assert!(plane.contains(Coord::new(4.0, -7.0), 0.0));
        assert!(!plane.contains(Coord::new(6.0, 0.0), 0.0));
    }

    #[test]
    fn clipping_a_square_in_half() {
        let square = Bounds {
            min: Coord::zero(),
            max: Coord::new(10.0, 10.0),
        };
        let plane = HalfPlane::bisector(Coord::new(2.0, 5.0), Coord::new(8.0, 5.0));
        let clipped = clip(&square.polygon(), &plane);

        assert_eq!(clipped.len(), 4);
        assert!(clipped.iter().all(|p| p.x <= 5.0 + 1e-9));
        assert!(clipped.contains(&Coord::new(5.0, 0.0)));
        assert!(clipped.contains(&Coord::new(5.0, 10.0)));
    }

    #[test]
    fn segment_distance_clamps_to_endpoints() {
        let a = Coord::zero();
        let b = Coord::new(10.0, 0.0);
        assert_eq!(segment_distance(Coord::new(5.0, 4.0), a, b), 4.0);
        assert_eq!(segment_distance(Coord::new(13.0, 4.0), a, b), 5.0);
        assert!((segment_distance(Coord::new(1.0, 1.0), a, a) - 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn bounds_cover_points_and_circles() {
        let bounds = Bounds::around([Coord::new(1.0, 2.0), Coord::new(-3.0, 5.0)], 1.0)
            .expect("non-empty");
        assert_eq!(bounds.min, Coord::new(-4.0, 1.0));
        assert_eq!(bounds.max, Coord::new(2.0, 6.0));

        let grown = bounds.include_circle(Coord::new(0.0, 0.0), 10.0);
        assert_eq!(grown.min, Coord::new(-10.0, -10.0));
        assert_eq!(grown.max, Coord::new(10.0, 10.0));
        assert!(Bounds::around(Vec::new(), 1.0).is_none());
    }
}
