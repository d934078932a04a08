use std::fmt;

use crate::{Coord, IconRef, TrackID};

/// Everything the engine asks a render sink to show.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RenderHandle {
    Mover(TrackID),
    /// One polyline per segment of a historical track
    Segment(TrackID, usize),
    /// The single, growing polyline of a live track
    LivePath(TrackID),
    Label(TrackID, Label),
}

/// Markers placed at the ends of a track, or at the ends of each segment when there's more than
/// one. Segments are numbered from 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Label {
    Start,
    End,
    SegmentStart(usize),
    SegmentEnd(usize),
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Label::Start => write!(f, "start"),
            Label::End => write!(f, "end"),
            Label::SegmentStart(n) | Label::SegmentEnd(n) => write!(f, "{}", n),
        }
    }
}

/// Whatever draws the map. The engine never knows how.
pub trait RenderSink {
    fn attach(&mut self, handle: &RenderHandle);
    fn detach(&mut self, handle: &RenderHandle);
    /// For movers and labels
    fn set_position(&mut self, handle: &RenderHandle, pt: Coord);
    /// For segments and live paths
    fn set_polyline(&mut self, handle: &RenderHandle, pts: &[Coord]);
    fn set_icon(&mut self, _handle: &RenderHandle, _icon: &IconRef) {}
}

/// Discards everything.
pub struct NullSink;

impl RenderSink for NullSink {
    fn attach(&mut self, _: &RenderHandle) {}
    fn detach(&mut self, _: &RenderHandle) {}
    fn set_position(&mut self, _: &RenderHandle, _: Coord) {}
    fn set_polyline(&mut self, _: &RenderHandle, _: &[Coord]) {}
}

#[derive(Clone, Debug, PartialEq)]
pub enum SinkEvent {
    Attach(RenderHandle),
    Detach(RenderHandle),
    Position(RenderHandle, Coord),
    Polyline(RenderHandle, Vec<Coord>),
    Icon(RenderHandle, IconRef),
}

/// Remembers every call, in order.
#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<SinkEvent>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_attached(&self, handle: &RenderHandle) -> bool {
        let mut attached = false;
        for ev in &self.events {
            match ev {
                SinkEvent::Attach(h) if h == handle => attached = true,
                SinkEvent::Detach(h) if h == handle => attached = false,
                _ => {}
            }
        }
        attached
    }

    pub fn last_position(&self, handle: &RenderHandle) -> Option<Coord> {
        self.events.iter().rev().find_map(|ev| match ev {
            SinkEvent::Position(h, pt) if h == handle => Some(*pt),
            _ => None,
        })
    }

    pub fn last_polyline(&self, handle: &RenderHandle) -> Option<&Vec<Coord>> {
        self.events.iter().rev().find_map(|ev| match ev {
            SinkEvent::Polyline(h, pts) if h == handle => Some(pts),
            _ => None,
        })
    }

    pub fn count_positions(&self, handle: &RenderHandle) -> usize {
        self.events
            .iter()
            .filter(|ev| matches!(ev, SinkEvent::Position(h, _) if h == handle))
            .count()
    }
}

impl RenderSink for RecordingSink {
    fn attach(&mut self, handle: &RenderHandle) {
        self.events.push(SinkEvent::Attach(handle.clone()));
    }

    fn detach(&mut self, handle: &RenderHandle) {
        self.events.push(SinkEvent::Detach(handle.clone()));
    }

    fn set_position(&mut self, handle: &RenderHandle, pt: Coord) {
        self.events.push(SinkEvent::Position(handle.clone(), pt));
    }

    fn set_polyline(&mut self, handle: &RenderHandle, pts: &[Coord]) {
        self.events
            .push(SinkEvent::Polyline(handle.clone(), pts.to_vec()));
    }

    fn set_icon(&mut self, handle: &RenderHandle, icon: &IconRef) {
        self.events.push(SinkEvent::Icon(handle.clone(), icon.clone()));
    }
}
