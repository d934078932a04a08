use std::fmt;

use anyhow::Result;
use geom::{Distance, LonLat};
use serde::{Deserialize, Serialize};

/// A position in whatever coordinate system the map is currently rendering in. Equality is exact.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
}

impl Coord {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Fails unless the slice is exactly two finite numbers.
    pub fn from_slice(raw: &[f64]) -> Result<Self> {
        if raw.len() != 2 {
            bail!("A coordinate needs exactly 2 numbers, not {}", raw.len());
        }
        Self::finite(raw[0], raw[1])
    }

    pub fn finite(x: f64, y: f64) -> Result<Self> {
        if !x.is_finite() || !y.is_finite() {
            bail!("Coordinate ({}, {}) isn't finite", x, y);
        }
        Ok(Self { x, y })
    }

    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Linearly interpolate towards `other`. `pct` isn't clamped.
    pub fn lerp(self, other: Coord, pct: f64) -> Self {
        Self::new(
            self.x + (other.x - self.x) * pct,
            self.y + (other.y - self.y) * pct,
        )
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// The coordinate system a position was recorded in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CoordSystem {
    /// Raw GPS
    Wgs84,
    /// The offset system used by Google and Gaode tiles in China
    Gcj02,
    /// Baidu's system, offset again from GCJ-02
    Bd09,
}

impl CoordSystem {
    /// Numeric IDs as they show up in position feeds. 0 is an old alias for WGS84.
    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            0 | 3 => Ok(CoordSystem::Wgs84),
            1 => Ok(CoordSystem::Gcj02),
            2 => Ok(CoordSystem::Bd09),
            _ => bail!("Unknown coordinate system {}", id),
        }
    }

    pub fn id(self) -> u8 {
        match self {
            CoordSystem::Wgs84 => 3,
            CoordSystem::Gcj02 => 1,
            CoordSystem::Bd09 => 2,
        }
    }
}

impl Default for CoordSystem {
    fn default() -> Self {
        CoordSystem::Gcj02
    }
}

/// Reprojects a point between coordinate systems. The math lives outside this crate; anything
/// implementing this is used as an opaque, synchronous service.
pub trait CoordinateTransform {
    fn transform(&self, pt: Coord, from: CoordSystem, to: CoordSystem) -> Coord;
}

impl<F: Fn(Coord, CoordSystem, CoordSystem) -> Coord> CoordinateTransform for F {
    fn transform(&self, pt: Coord, from: CoordSystem, to: CoordSystem) -> Coord {
        self(pt, from, to)
    }
}

/// Leaves every point alone. Useful when all input already matches the map.
pub struct IdentityTransform;

impl CoordinateTransform for IdentityTransform {
    fn transform(&self, pt: Coord, _: CoordSystem, _: CoordSystem) -> Coord {
        pt
    }
}

/// A transform plus the coordinate system the map currently renders in.
pub struct Projection {
    transform: Box<dyn CoordinateTransform>,
    active: CoordSystem,
}

impl Projection {
    pub fn new<T: CoordinateTransform + 'static>(transform: T, active: CoordSystem) -> Self {
        Self {
            transform: Box::new(transform),
            active,
        }
    }

    pub fn identity(active: CoordSystem) -> Self {
        Self::new(IdentityTransform, active)
    }

    pub fn active(&self) -> CoordSystem {
        self.active
    }

    pub fn set_active(&mut self, active: CoordSystem) {
        self.active = active;
    }

    /// Never calls the transform when the systems match, so the identity case is exact.
    pub fn convert(&self, pt: Coord, from: CoordSystem, to: CoordSystem) -> Coord {
        if from == to {
            return pt;
        }
        self.transform.transform(pt, from, to)
    }

    /// Points without an explicit system are assumed to already be in the active one.
    pub fn to_active(&self, pt: Coord, system: Option<CoordSystem>) -> Coord {
        match system {
            Some(from) => self.convert(pt, from, self.active),
            None => pt,
        }
    }
}

/// How to measure the distance between two coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Metric {
    /// Coordinates are longitude/latitude degrees
    Geodesic,
    /// Coordinates are already in meters
    Planar,
}

impl Default for Metric {
    fn default() -> Self {
        Metric::Geodesic
    }
}

impl Metric {
    pub fn distance(self, a: Coord, b: Coord) -> Distance {
        match self {
            Metric::Geodesic => LonLat::new(a.x, a.y).gps_dist(LonLat::new(b.x, b.y)),
            Metric::Planar => Distance::meters((b.x - a.x).hypot(b.y - a.y)),
        }
    }
}

/// An axis-aligned bounding box, for fitting the view around tracks.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Extent {
    pub fn around(pts: impl IntoIterator<Item = Coord>) -> Option<Extent> {
        let mut extent: Option<Extent> = None;
        for pt in pts {
            extent = Some(match extent {
                None => Extent {
                    min_x: pt.x,
                    min_y: pt.y,
                    max_x: pt.x,
                    max_y: pt.y,
                },
                Some(e) => Extent {
                    min_x: e.min_x.min(pt.x),
                    min_y: e.min_y.min(pt.y),
                    max_x: e.max_x.max(pt.x),
                    max_y: e.max_y.max(pt.y),
                },
            });
        }
        extent
    }

    pub fn union(self, other: Extent) -> Extent {
        Extent {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    // Pretend each system is a fixed offset from WGS84, which makes the transform invertible.
    fn offsets(pt: Coord, from: CoordSystem, to: CoordSystem) -> Coord {
        fn shift(system: CoordSystem) -> (f64, f64) {
            match system {
                CoordSystem::Wgs84 => (0.0, 0.0),
                CoordSystem::Gcj02 => (0.0061, 0.0023),
                CoordSystem::Bd09 => (0.0126, 0.0060),
            }
        }
        let (fx, fy) = shift(from);
        let (tx, ty) = shift(to);
        Coord::new(pt.x - fx + tx, pt.y - fy + ty)
    }

    #[test]
    fn round_trip_projection() {
        let projection = Projection::new(offsets, CoordSystem::Gcj02);
        let original = Coord::new(104.04424726323334, 30.631515822111055);
        let there = projection.convert(original, CoordSystem::Bd09, CoordSystem::Wgs84);
        let back = projection.convert(there, CoordSystem::Wgs84, CoordSystem::Bd09);
        assert_relative_eq!(back.x, original.x, epsilon = 1e-9);
        assert_relative_eq!(back.y, original.y, epsilon = 1e-9);
    }

    #[test]
    fn identity_is_exact() {
        // Would be wildly wrong if the transform were consulted
        let projection = Projection::new(
            |_: Coord, _: CoordSystem, _: CoordSystem| Coord::new(f64::NAN, f64::NAN),
            CoordSystem::Wgs84,
        );
        let pt = Coord::new(0.1 + 0.2, 7.0);
        assert_eq!(projection.to_active(pt, Some(CoordSystem::Wgs84)), pt);
        assert_eq!(projection.to_active(pt, None), pt);
    }

    #[test]
    fn system_ids() {
        assert_eq!(CoordSystem::from_id(0).unwrap(), CoordSystem::Wgs84);
        assert_eq!(CoordSystem::from_id(2).unwrap(), CoordSystem::Bd09);
        assert!(CoordSystem::from_id(9).is_err());
    }

    #[test]
    fn coordinate_shape() {
        assert!(Coord::from_slice(&[1.0]).is_err());
        assert!(Coord::from_slice(&[1.0, f64::NAN]).is_err());
        assert_eq!(Coord::from_slice(&[1.0, 2.0]).unwrap(), Coord::new(1.0, 2.0));
    }

    #[test]
    fn planar_distance() {
        let d = Metric::Planar.distance(Coord::new(0.0, 0.0), Coord::new(3.0, 4.0));
        assert_relative_eq!(d.inner_meters(), 5.0);
    }

    #[test]
    fn extent_of_points() {
        assert_eq!(Extent::around(Vec::new()), None);
        let e = Extent::around(vec![Coord::new(1.0, 5.0), Coord::new(-2.0, 3.0)]).unwrap();
        assert_eq!((e.min_x, e.min_y, e.max_x, e.max_y), (-2.0, 3.0, 1.0, 5.0));
    }
}
