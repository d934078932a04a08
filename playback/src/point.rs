use std::convert::TryFrom;
use std::ops::Range;

use anyhow::Result;
use serde::Deserialize;

use crate::{Coord, CoordSystem, Projection};

/// An input point before any normalization: `[x, y, time]` or `[x, y, time, system]`.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(try_from = "Vec<f64>")]
pub struct RawPoint {
    pub pt: Coord,
    /// Milliseconds or seconds since the epoch; normalization widens seconds
    pub time: i64,
    pub system: Option<CoordSystem>,
}

impl RawPoint {
    pub fn new(x: f64, y: f64, time: i64) -> Self {
        Self {
            pt: Coord::new(x, y),
            time,
            system: None,
        }
    }

    pub fn in_system(mut self, system: CoordSystem) -> Self {
        self.system = Some(system);
        self
    }
}

impl TryFrom<Vec<f64>> for RawPoint {
    type Error = anyhow::Error;

    fn try_from(raw: Vec<f64>) -> Result<Self> {
        if raw.len() < 3 {
            bail!("A point needs at least [x, y, time], but got {:?}", raw);
        }
        let pt = Coord::finite(raw[0], raw[1])?;
        if !raw[2].is_finite() {
            bail!("Point {} has a bad timestamp {}", pt, raw[2]);
        }
        let system = match raw.get(3) {
            Some(id) if id.fract() == 0.0 && *id >= 0.0 && *id <= 255.0 => {
                Some(CoordSystem::from_id(*id as u8)?)
            }
            Some(id) => bail!("Point {} has a bad coordinate system {}", pt, id),
            None => None,
        };
        Ok(Self {
            pt,
            time: raw[2] as i64,
            system,
        })
    }
}

/// A normalized point on a path.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    /// In the active coordinate system
    pub pt: Coord,
    /// Milliseconds since the epoch
    pub time: i64,
    /// The system the point was recorded in, if the feed said
    pub system: Option<CoordSystem>,
    /// As recorded, before any projection
    pub original: Coord,
}

impl Point {
    pub fn project(raw: RawPoint, projection: &Projection) -> Self {
        Self {
            pt: projection.to_active(raw.pt, raw.system),
            time: widen_timestamp(raw.time),
            system: raw.system,
            original: raw.pt,
        }
    }

    /// Redo the projection from the original coordinate, after the active system changes.
    pub fn reproject(&mut self, projection: &Projection) {
        if self.system.is_some() {
            self.pt = projection.to_active(self.original, self.system);
        }
    }
}

/// Some feeds report seconds. 10 digits means seconds, so scale up to milliseconds.
pub fn widen_timestamp(time: i64) -> i64 {
    if (1_000_000_000..10_000_000_000).contains(&time) {
        time * 1000
    } else {
        time
    }
}

/// Input is usually either already sorted or entirely reversed, so only compare the endpoints
/// before paying for a sort. The sort is stable, keeping duplicate timestamps in input order.
pub fn sort_by_time(pts: &mut Vec<RawPoint>) {
    if let (Some(first), Some(last)) = (pts.first(), pts.last()) {
        if first.time < last.time {
            return;
        }
    }
    pts.sort_by_key(|pt| pt.time);
}

/// A maximal run of points without a time gap over the threshold.
#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    pub start: Point,
    pub end: Point,
    /// Indices into the path
    pub points: Range<usize>,
}

/// Splits a path wherever the gap between successive points exceeds `max_gap_ms`.
pub fn find_segments(path: &[Point], max_gap_ms: i64) -> Vec<Segment> {
    let mut segments = Vec::new();
    if path.is_empty() {
        return segments;
    }
    let mut first = 0;
    for idx in 1..path.len() {
        if path[idx].time - path[idx - 1].time > max_gap_ms {
            segments.push(Segment {
                start: path[first],
                end: path[idx - 1],
                points: first..idx,
            });
            first = idx;
        }
    }
    segments.push(Segment {
        start: path[first],
        end: path[path.len() - 1],
        points: first..path.len(),
    });
    segments
}
