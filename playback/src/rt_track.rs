use std::rc::Rc;

use anyhow::Result;
use serde::Deserialize;

use crate::{
    Category, Coord, CoordSystem, Extent, IconTable, Kind, Mover, PlaybackConfig, Point,
    Projection, RawPoint, RenderHandle, RenderSink, Status, TrackID,
};

/// One position report from a live feed, already parsed.
#[derive(Clone, Debug, Deserialize)]
pub struct Report {
    #[serde(alias = "lng")]
    pub x: f64,
    #[serde(alias = "lat")]
    pub y: f64,
    #[serde(alias = "posTime", default)]
    pub time: i64,
    /// Numeric ID of the coordinate system, if the feed says
    #[serde(alias = "coordinateSystem", default)]
    pub system: Option<u8>,
    /// Numeric kind of the mover, if the feed says
    #[serde(alias = "showType", default)]
    pub kind: Option<u8>,
    #[serde(alias = "warningFlag", default)]
    pub warning: bool,
    #[serde(alias = "alarmFlag", default)]
    pub alarm: bool,
}

impl Report {
    pub fn new(x: f64, y: f64, time: i64) -> Self {
        Self {
            x,
            y,
            time,
            system: None,
            kind: None,
            warning: false,
            alarm: false,
        }
    }

    pub fn status(&self) -> Status {
        if self.alarm {
            Status::Alarm
        } else if self.warning {
            Status::Warning
        } else {
            Status::Normal
        }
    }

    fn project(&self, projection: &Projection) -> Result<Point> {
        let system = match self.system {
            Some(id) => Some(CoordSystem::from_id(id)?),
            None => None,
        };
        let raw = RawPoint {
            pt: Coord::finite(self.x, self.y)?,
            time: self.time,
            system,
        };
        Ok(Point::project(raw, projection))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LiveState {
    Uninitialized,
    Initialized,
    Idle,
    Moving,
    Paused,
}

/// Called every tick while a live update glides into place.
pub type TimerCallback = Box<dyn FnMut(&RTTrack)>;

/// A glide from the last known point to a new report.
#[derive(Clone, Copy, Debug)]
struct Tween {
    target: Point,
    step: Coord,
    frames_left: usize,
}

impl Tween {
    /// Compare along whichever axis moves more, so a nearly vertical move doesn't depend on
    /// tiny x steps.
    fn reached(&self, pt: Coord) -> bool {
        if self.step.x.abs() >= self.step.y.abs() {
            if self.step.x > 0.0 {
                pt.x >= self.target.pt.x
            } else {
                pt.x <= self.target.pt.x
            }
        } else if self.step.y > 0.0 {
            pt.y >= self.target.pt.y
        } else {
            pt.y <= self.target.pt.y
        }
    }
}

/// A track that grows as reports arrive. Each new report is reached by gliding over a fixed
/// number of ticks; anything arriving mid-glide is dropped.
pub struct RTTrack {
    id: TrackID,
    path: Vec<Point>,
    /// The path plus every intermediate point of the glide in flight
    working: Vec<Coord>,
    mover: Mover,
    active: bool,
    state: LiveState,
    tween: Option<Tween>,
    tween_frames: usize,
    on_tick: Option<TimerCallback>,
}

impl RTTrack {
    /// IDs look like "bd_455990"; without a category, "bd" is assumed.
    pub fn new(id: &str, config: &PlaybackConfig, icons: Rc<IconTable>) -> Result<RTTrack> {
        if id.trim().is_empty() {
            bail!("A live track needs an ID");
        }
        let (category, number) = match id.split_once('_') {
            Some((category, number)) => (Category::new(category), number),
            None => (Category::default(), id),
        };
        if number.is_empty() {
            bail!("Live track ID {} is missing a number", id);
        }
        let id = TrackID(format!("{}_{}", category.0, number));
        Ok(RTTrack {
            mover: Mover::new(RenderHandle::Mover(id.clone()), category, Kind::Default, icons),
            id,
            path: Vec::new(),
            working: Vec::new(),
            active: false,
            state: LiveState::Uninitialized,
            tween: None,
            tween_frames: config.tween_frames.max(1),
            on_tick: None,
        })
    }

    pub fn set_timer_callback(&mut self, cb: Option<TimerCallback>) {
        self.on_tick = cb;
    }

    /// Start from any number of known reports. The mover sits on the last one.
    pub fn init(
        &mut self,
        reports: Vec<Report>,
        projection: &Projection,
        sink: &mut dyn RenderSink,
    ) -> Result<()> {
        // Project everything before touching any state
        let mut path = Vec::new();
        for report in &reports {
            path.push(report.project(projection)?);
        }
        let kind = match reports.last().and_then(|report| report.kind) {
            Some(id) => Some(Kind::from_id(id)?),
            None => None,
        };
        if let Some(last) = path.last() {
            Coord::finite(last.pt.x, last.pt.y)?;
        }

        self.tween = None;
        self.path = path;
        self.working = self.coords();
        if let (Some(report), Some(last)) = (reports.last(), self.path.last()) {
            self.mover.init(&[last.pt.x, last.pt.y], sink)?;
            if let Some(kind) = kind {
                let category = self.mover.category().clone();
                self.mover.set_category(category, kind, sink);
            }
            self.mover.set_status(report.status(), sink);
        }
        if self.active {
            sink.set_polyline(&self.live_path(), &self.working);
        }
        self.state = LiveState::Initialized;
        Ok(())
    }

    /// Returns true if the report starts moving the mover. Reports arriving while a glide is in
    /// flight, or repeating the last position, are dropped.
    pub fn update(
        &mut self,
        report: Report,
        projection: &Projection,
        sink: &mut dyn RenderSink,
    ) -> Result<bool> {
        if self.tween.is_some() {
            debug!("{} is still moving; dropping report at {}", self.id, report.time);
            return Ok(false);
        }
        let target = report.project(projection)?;
        self.mover.set_status(report.status(), sink);

        let before = match self.path.last().map(|pt| pt.pt) {
            Some(pt) => pt,
            None => {
                // Nothing to glide from
                self.path.push(target);
                self.mover.init(&[target.pt.x, target.pt.y], sink)?;
                self.working = self.coords();
                sink.set_polyline(&self.live_path(), &self.working);
                self.state = LiveState::Idle;
                return Ok(true);
            }
        };
        if target.pt == before {
            return Ok(false);
        }

        let frames = self.tween_frames as f64;
        self.tween = Some(Tween {
            target,
            step: Coord::new(
                (target.pt.x - before.x) / frames,
                (target.pt.y - before.y) / frames,
            ),
            frames_left: self.tween_frames,
        });
        self.working = self.coords();
        self.state = LiveState::Moving;
        Ok(true)
    }

    /// Advance the glide in flight by one step, if not paused.
    pub fn tick(&mut self, sink: &mut dyn RenderSink) {
        let tween = match self.tween {
            Some(tween) => tween,
            None => return,
        };
        if self.state != LiveState::Moving {
            return;
        }

        let here = self
            .mover
            .coordinate()
            .or_else(|| self.path.last().map(|pt| pt.pt));
        let here = match here {
            Some(pt) => pt,
            None => return,
        };
        let next = here.offset(tween.step.x, tween.step.y);
        if tween.reached(next) || tween.frames_left <= 1 {
            self.commit(tween.target, sink);
        } else {
            self.working.push(next);
            sink.set_polyline(&self.live_path(), &self.working);
            self.mover.update(next, sink);
            if let Some(ref mut t) = self.tween {
                t.frames_left -= 1;
            }
        }
        self.fire();
    }

    fn commit(&mut self, target: Point, sink: &mut dyn RenderSink) {
        self.path.push(target);
        self.working = self.coords();
        self.mover.update(target.pt, sink);
        sink.set_polyline(&self.live_path(), &self.working);
        self.tween = None;
        self.state = LiveState::Idle;
    }

    /// Ticks stop moving anything, but the glide isn't cancelled.
    pub fn pause(&mut self) {
        if self.state == LiveState::Moving {
            self.state = LiveState::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.state == LiveState::Paused {
            self.state = if self.tween.is_some() {
                LiveState::Moving
            } else {
                LiveState::Idle
            };
        }
    }

    pub fn activate(&mut self, sink: &mut dyn RenderSink) {
        if self.active {
            return;
        }
        let live_path = self.live_path();
        sink.attach(&live_path);
        sink.set_polyline(&live_path, &self.working);
        sink.attach(self.mover.handle());
        self.mover.show(sink);
        self.active = true;
    }

    pub fn deactivate(&mut self, sink: &mut dyn RenderSink) {
        if !self.active {
            return;
        }
        sink.detach(&self.live_path());
        sink.detach(self.mover.handle());
        self.active = false;
    }

    /// Cancels any glide in flight before taking the track off the map.
    pub fn destroy(mut self, sink: &mut dyn RenderSink) {
        self.tween = None;
        self.deactivate(sink);
        debug!("Destroyed live track {}", self.id);
    }

    /// Re-project every point from its original coordinate. A glide in flight continues towards
    /// the re-projected target over the frames it had left.
    pub fn reproject(
        &mut self,
        projection: &Projection,
        old_system: CoordSystem,
        sink: &mut dyn RenderSink,
    ) {
        if self.path.is_empty() {
            return;
        }
        let resume = self.state == LiveState::Moving;
        self.pause();

        for pt in &mut self.path {
            pt.reproject(projection);
        }
        self.working = self.coords();
        match self.tween {
            Some(ref mut tween) => {
                tween.target.reproject(projection);
                if let Some(pt) = self.mover.coordinate() {
                    let pt = projection.convert(pt, old_system, projection.active());
                    self.mover.update(pt, sink);
                    self.working.push(pt);
                    let frames = tween.frames_left.max(1) as f64;
                    tween.step = Coord::new(
                        (tween.target.pt.x - pt.x) / frames,
                        (tween.target.pt.y - pt.y) / frames,
                    );
                }
            }
            None => {
                if let Some(pt) = self.working.last() {
                    self.mover.update(*pt, sink);
                }
            }
        }
        sink.set_polyline(&self.live_path(), &self.working);

        if resume {
            self.resume();
        }
    }

    fn fire(&mut self) {
        if let Some(mut cb) = self.on_tick.take() {
            cb(self);
            self.on_tick = Some(cb);
        }
    }

    fn coords(&self) -> Vec<Coord> {
        self.path.iter().map(|pt| pt.pt).collect()
    }

    fn live_path(&self) -> RenderHandle {
        RenderHandle::LivePath(self.id.clone())
    }

    pub fn extent(&self) -> Option<Extent> {
        Extent::around(self.path.iter().map(|pt| pt.pt))
    }

    pub fn id(&self) -> &TrackID {
        &self.id
    }

    pub fn path(&self) -> &[Point] {
        &self.path
    }

    pub fn working_path(&self) -> &[Coord] {
        &self.working
    }

    pub fn mover(&self) -> &Mover {
        &self.mover
    }

    pub fn state(&self) -> LiveState {
        self.state
    }

    pub fn is_moving(&self) -> bool {
        self.tween.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}
