use std::rc::Rc;

use anyhow::Result;
use serde::Deserialize;

use crate::point::{find_segments, sort_by_time};
use crate::timeline::{OnTick, Speed, State};
use crate::{
    Category, Coord, CoordSystem, Extent, IconTable, Kind, Label, Mover, NullSink,
    PlaybackConfig, Point, Projection, RawPoint, RenderHandle, RenderSink, Segment, TimeLine,
    TrackID,
};

/// A historical track as it arrives from the data source.
#[derive(Clone, Debug, Deserialize)]
pub struct TrackInput {
    /// The unique number of the source in its database
    pub source_id: Option<String>,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub kind: Kind,
    pub points: Vec<RawPoint>,
}

/// A finished path, split into segments, with one mover to play it back.
pub struct Track {
    id: TrackID,
    path: Vec<Point>,
    segments: Vec<Segment>,
    labels: Vec<(Label, Coord)>,
    mover: Mover,
    timeline: TimeLine,
    active: bool,
}

impl Track {
    /// Fails without building anything if the input is malformed.
    pub fn new(
        input: TrackInput,
        projection: &Projection,
        config: &PlaybackConfig,
        icons: Rc<IconTable>,
    ) -> Result<Track> {
        let source_id = match input.source_id {
            Some(id) if !id.trim().is_empty() => id,
            _ => bail!("Track input is missing a source ID"),
        };
        if input.points.is_empty() {
            bail!("Track {} has no points", source_id);
        }
        let id = TrackID(format!("{}_{}", input.category.0, source_id));

        let mut raw = input.points;
        sort_by_time(&mut raw);
        let path: Vec<Point> = raw
            .into_iter()
            .map(|pt| Point::project(pt, projection))
            .collect();
        for pair in path.windows(2) {
            if pair[0].time > pair[1].time {
                bail!(
                    "Track {} input out-of-order: {} then {}",
                    id,
                    pair[0].time,
                    pair[1].time
                );
            }
        }
        let segments = find_segments(&path, config.max_gap_ms);
        let labels = make_labels(&path, &segments);

        let mut mover = Mover::new(
            RenderHandle::Mover(id.clone()),
            input.category,
            input.kind,
            icons,
        );
        // Not attached to anything yet; activating shows it
        mover.init(&[path[0].pt.x, path[0].pt.y], &mut NullSink)?;

        info!(
            "Track {} has {} points in {} segments",
            id,
            path.len(),
            segments.len()
        );
        Ok(Track {
            id,
            path,
            segments,
            labels,
            mover,
            timeline: TimeLine::new(config.clone()),
            active: false,
        })
    }

    /// Hand the path to the timeline, so it can be played.
    pub fn start_up(&mut self, on_tick: Option<OnTick>) -> Result<()> {
        self.timeline.init(self.path.clone(), on_tick)
    }

    pub fn activate(&mut self, sink: &mut dyn RenderSink) {
        if self.active {
            return;
        }
        for (idx, segment) in self.segments.iter().enumerate() {
            let handle = RenderHandle::Segment(self.id.clone(), idx);
            sink.attach(&handle);
            sink.set_polyline(&handle, &self.segment_pts(segment));
        }
        for (label, pt) in &self.labels {
            let handle = RenderHandle::Label(self.id.clone(), *label);
            sink.attach(&handle);
            sink.set_position(&handle, *pt);
        }
        sink.attach(self.mover.handle());
        self.mover.show(sink);
        self.active = true;
    }

    /// Stops playback and takes everything off the map.
    pub fn deactivate(&mut self, sink: &mut dyn RenderSink) {
        if !self.active {
            return;
        }
        self.timeline.stop(&mut self.mover, sink);
        for handle in self.handles() {
            sink.detach(&handle);
        }
        self.active = false;
    }

    /// Consumes the track, so it can't be used afterwards.
    pub fn destroy(mut self, sink: &mut dyn RenderSink) {
        self.deactivate(sink);
        debug!("Destroyed track {}", self.id);
    }

    pub fn play(&mut self, sink: &mut dyn RenderSink) {
        self.timeline.play(&mut self.mover, sink);
    }

    pub fn pause(&mut self) {
        self.timeline.pause();
    }

    pub fn stop(&mut self, sink: &mut dyn RenderSink) {
        self.timeline.stop(&mut self.mover, sink);
    }

    pub fn restart(&mut self, sink: &mut dyn RenderSink) {
        self.timeline.restart(&mut self.mover, sink);
    }

    pub fn speed_up(&mut self) -> Speed {
        self.timeline.speed_up()
    }

    pub fn speed_down(&mut self) -> Speed {
        self.timeline.speed_down()
    }

    pub fn seek_forward(&mut self) {
        self.timeline.seek_forward();
    }

    pub fn seek_backward(&mut self) {
        self.timeline.seek_backward();
    }

    pub fn tick(&mut self, sink: &mut dyn RenderSink) {
        self.timeline.tick(&mut self.mover, sink);
    }

    /// The map switched coordinate systems. Points with a known system are projected again from
    /// their original coordinates, and everything on the map follows.
    pub fn reproject(
        &mut self,
        projection: &Projection,
        old_system: CoordSystem,
        sink: &mut dyn RenderSink,
    ) {
        let resume = self.timeline.state() == State::Playing;
        if resume {
            self.timeline.pause();
        }

        for pt in &mut self.path {
            pt.reproject(projection);
        }
        for segment in &mut self.segments {
            segment.start = self.path[segment.points.start];
            segment.end = self.path[segment.points.end - 1];
        }
        self.labels = make_labels(&self.path, &self.segments);
        if self.active {
            for (idx, segment) in self.segments.iter().enumerate() {
                let handle = RenderHandle::Segment(self.id.clone(), idx);
                sink.set_polyline(&handle, &self.segment_pts(segment));
            }
            for (label, pt) in &self.labels {
                sink.set_position(&RenderHandle::Label(self.id.clone(), *label), *pt);
            }
        }
        if let Some(pt) = self.mover.coordinate() {
            let pt = projection.convert(pt, old_system, projection.active());
            self.mover.update(pt, sink);
        }
        self.timeline.replace_path(self.path.clone());

        if resume {
            self.timeline.play(&mut self.mover, sink);
        }
    }

    fn segment_pts(&self, segment: &Segment) -> Vec<Coord> {
        self.path[segment.points.clone()]
            .iter()
            .map(|pt| pt.pt)
            .collect()
    }

    /// Everything this track shows on the map
    pub fn handles(&self) -> Vec<RenderHandle> {
        let mut handles = Vec::new();
        for idx in 0..self.segments.len() {
            handles.push(RenderHandle::Segment(self.id.clone(), idx));
        }
        for (label, _) in &self.labels {
            handles.push(RenderHandle::Label(self.id.clone(), *label));
        }
        handles.push(self.mover.handle().clone());
        handles
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

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn labels(&self) -> &[(Label, Coord)] {
        &self.labels
    }

    pub fn mover(&self) -> &Mover {
        &self.mover
    }

    pub fn timeline(&self) -> &TimeLine {
        &self.timeline
    }

    pub fn timeline_mut(&mut self) -> &mut TimeLine {
        &mut self.timeline
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

/// Start and end of the whole track when it's in one piece; otherwise both ends of every
/// segment, numbered.
fn make_labels(path: &[Point], segments: &[Segment]) -> Vec<(Label, Coord)> {
    if segments.len() <= 1 {
        return vec![
            (Label::Start, path[0].pt),
            (Label::End, path[path.len() - 1].pt),
        ];
    }
    let mut labels = Vec::new();
    for (idx, segment) in segments.iter().enumerate() {
        labels.push((Label::SegmentStart(idx + 1), segment.start.pt));
        labels.push((Label::SegmentEnd(idx + 1), segment.end.pt));
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RecordingSink, SinkEvent};

    fn input(source_id: Option<&str>, points: Vec<RawPoint>) -> TrackInput {
        TrackInput {
            source_id: source_id.map(|id| id.to_string()),
            category: Category::default(),
            kind: Kind::Vehicle,
            points,
        }
    }

    fn make(input: TrackInput, config: &PlaybackConfig) -> Result<Track> {
        Track::new(
            input,
            &Projection::identity(CoordSystem::Wgs84),
            config,
            Rc::new(IconTable::builtin()),
        )
    }

    #[test]
    fn reject_structural_problems() {
        let pts = vec![RawPoint::new(1.0, 1.0, 0)];
        assert!(make(input(None, pts.clone()), &Default::default()).is_err());
        assert!(make(input(Some("  "), pts), &Default::default()).is_err());
        assert!(make(input(Some("122"), Vec::new()), &Default::default()).is_err());

        // Sorted at the ends, but not in the middle
        let shuffled = vec![
            RawPoint::new(0.0, 0.0, 10),
            RawPoint::new(1.0, 0.0, 40),
            RawPoint::new(2.0, 0.0, 20),
            RawPoint::new(3.0, 0.0, 50),
        ];
        assert!(make(input(Some("122"), shuffled), &Default::default()).is_err());
    }

    #[test]
    fn parse_input() {
        let input: TrackInput = serde_json::from_str(
            r#"{"source_id": "122", "kind": "Vessel", "points": [[1, 2, 1502380680]]}"#,
        )
        .unwrap();
        let track = make(input, &Default::default()).unwrap();
        assert_eq!(track.id(), &TrackID("bd_122".to_string()));
        assert_eq!(track.path()[0].time, 1_502_380_680_000);
        assert_eq!(track.mover().kind(), Kind::Vessel);
    }

    #[test]
    fn normalize_reversed_input() {
        let mut config = PlaybackConfig::default();
        config.max_gap_ms = 1000;
        let track = make(
            input(
                Some("7"),
                vec![
                    RawPoint::new(3.0, 0.0, 50_200),
                    RawPoint::new(2.0, 0.0, 50_100),
                    RawPoint::new(1.0, 0.0, 100),
                    RawPoint::new(0.0, 0.0, 0),
                ],
            ),
            &config,
        )
        .unwrap();

        let times: Vec<i64> = track.path().iter().map(|pt| pt.time).collect();
        assert_eq!(times, vec![0, 100, 50_100, 50_200]);
        assert_eq!(track.segments().len(), 2);
        assert_eq!(
            track.labels(),
            &[
                (Label::SegmentStart(1), Coord::new(0.0, 0.0)),
                (Label::SegmentEnd(1), Coord::new(1.0, 0.0)),
                (Label::SegmentStart(2), Coord::new(2.0, 0.0)),
                (Label::SegmentEnd(2), Coord::new(3.0, 0.0)),
            ]
        );
        assert_eq!(track.mover().coordinate(), Some(Coord::new(0.0, 0.0)));
    }

    #[test]
    fn one_segment_gets_start_and_end() {
        let track = make(
            input(
                Some("7"),
                vec![RawPoint::new(0.0, 0.0, 0), RawPoint::new(1.0, 1.0, 1000)],
            ),
            &Default::default(),
        )
        .unwrap();
        assert_eq!(
            track.labels(),
            &[
                (Label::Start, Coord::new(0.0, 0.0)),
                (Label::End, Coord::new(1.0, 1.0)),
            ]
        );
    }

    #[test]
    fn activate_play_deactivate() {
        let mut sink = RecordingSink::new();
        let mut track = make(
            input(
                Some("7"),
                vec![RawPoint::new(0.0, 0.0, 0), RawPoint::new(1.0, 0.0, 2560)],
            ),
            &Default::default(),
        )
        .unwrap();
        track.activate(&mut sink);
        let handles = track.handles();
        assert_eq!(handles.len(), 4);
        for handle in &handles {
            assert!(sink.is_attached(handle));
        }
        assert_eq!(
            sink.last_polyline(&handles[0]),
            Some(&vec![Coord::new(0.0, 0.0), Coord::new(1.0, 0.0)])
        );

        track.start_up(None).unwrap();
        track.play(&mut sink);
        for _ in 0..5 {
            track.tick(&mut sink);
        }
        assert_eq!(track.mover().coordinate(), Some(Coord::new(0.5, 0.0)));

        track.deactivate(&mut sink);
        assert!(!track.is_active());
        assert_eq!(track.timeline().state(), State::Stopped);
        assert!(!track.timeline().is_scheduled());
        for handle in &handles {
            assert!(!sink.is_attached(handle));
        }
        // Snapped back to the start before being taken off the map
        assert_eq!(
            sink.last_position(track.mover().handle()),
            Some(Coord::new(0.0, 0.0))
        );
    }

    #[test]
    fn destroy_while_playing() {
        let mut sink = RecordingSink::new();
        let mut track = make(
            input(
                Some("7"),
                vec![RawPoint::new(0.0, 0.0, 0), RawPoint::new(1.0, 0.0, 10_000)],
            ),
            &Default::default(),
        )
        .unwrap();
        track.activate(&mut sink);
        track.start_up(None).unwrap();
        track.play(&mut sink);
        track.tick(&mut sink);
        let handles = track.handles();

        track.destroy(&mut sink);
        assert!(matches!(sink.events.last(), Some(SinkEvent::Detach(_))));
        for handle in &handles {
            assert!(!sink.is_attached(handle));
        }
    }

    #[test]
    fn reproject_from_originals() {
        let mut sink = RecordingSink::new();
        let shift = |pt: Coord, _: CoordSystem, to: CoordSystem| match to {
            CoordSystem::Bd09 => pt.offset(10.0, 0.0),
            _ => pt.offset(1.0, 0.0),
        };
        let mut projection = Projection::new(shift, CoordSystem::Gcj02);
        let mut track = Track::new(
            input(
                Some("7"),
                vec![
                    RawPoint::new(0.0, 0.0, 0).in_system(CoordSystem::Wgs84),
                    RawPoint::new(5.0, 0.0, 1_000),
                ],
            ),
            &projection,
            &Default::default(),
            Rc::new(IconTable::builtin()),
        )
        .unwrap();
        assert_eq!(track.path()[0].pt, Coord::new(1.0, 0.0));
        track.activate(&mut sink);
        track.start_up(None).unwrap();
        track.play(&mut sink);

        projection.set_active(CoordSystem::Bd09);
        track.reproject(&projection, CoordSystem::Gcj02, &mut sink);
        // Projected from the original, not stacked on the old projection
        assert_eq!(track.path()[0].pt, Coord::new(10.0, 0.0));
        // No known system, so left alone
        assert_eq!(track.path()[1].pt, Coord::new(5.0, 0.0));
        assert_eq!(track.timeline().path()[0].pt, Coord::new(10.0, 0.0));
        assert_eq!(track.labels()[0], (Label::Start, Coord::new(10.0, 0.0)));
        assert_eq!(track.mover().coordinate(), Some(Coord::new(11.0, 0.0)));
        assert_eq!(track.timeline().state(), State::Playing);
        assert_eq!(
            sink.last_polyline(&RenderHandle::Segment(track.id().clone(), 0)),
            Some(&vec![Coord::new(10.0, 0.0), Coord::new(5.0, 0.0)])
        );
    }
}
