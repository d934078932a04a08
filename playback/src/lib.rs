//! Animates moving things along historical and live paths. Nothing here draws; positions and
//! lines are pushed to a `RenderSink`, and a frame loop calls `tick`.

#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

mod config;
mod coord;
mod mover;
mod point;
mod rt_track;
mod sink;
mod timeline;
mod track;
mod tracker;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use self::config::{Algorithm, PlaybackConfig};
pub use self::coord::{
    Coord, CoordSystem, CoordinateTransform, Extent, IdentityTransform, Metric, Projection,
};
pub use self::mover::{Category, IconRef, IconTable, Kind, Mover, Status};
pub use self::point::{widen_timestamp, Point, RawPoint, Segment};
pub use self::rt_track::{LiveState, RTTrack, Report, TimerCallback};
pub use self::sink::{Label, NullSink, RecordingSink, RenderHandle, RenderSink, SinkEvent};
pub use self::timeline::{OnTick, Speed, State, TimeLine};
pub use self::track::{Track, TrackInput};
pub use self::tracker::{TrackKind, Tracker};

/// Unique per map, like "bd_122": the category, then the number of the source.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackID(pub String);

impl fmt::Display for TrackID {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
