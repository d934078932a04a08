use std::collections::BTreeMap;
use std::rc::Rc;

use anyhow::Result;

use crate::rt_track::TimerCallback;
use crate::timeline::OnTick;
use crate::{
    CoordSystem, CoordinateTransform, Extent, IconTable, NullSink, PlaybackConfig, Projection,
    RTTrack, RenderSink, Report, Track, TrackID, TrackInput,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackKind {
    Historical,
    Live,
}

/// Owns every historical and live track shown on one map.
pub struct Tracker {
    config: PlaybackConfig,
    projection: Projection,
    icons: Rc<IconTable>,
    tracks: BTreeMap<TrackID, Track>,
    live: BTreeMap<TrackID, RTTrack>,
    /// The historical track the playback controls act on
    current: Option<TrackID>,
}

impl Tracker {
    pub fn new<T: CoordinateTransform + 'static>(
        config: PlaybackConfig,
        transform: T,
        icons: IconTable,
    ) -> Tracker {
        Tracker {
            projection: Projection::new(transform, config.coord_system),
            config,
            icons: Rc::new(icons),
            tracks: BTreeMap::new(),
            live: BTreeMap::new(),
            current: None,
        }
    }

    /// Replaces any track with the same ID. If the input is bad, nothing changes.
    pub fn create_track(
        &mut self,
        input: TrackInput,
        sink: &mut dyn RenderSink,
    ) -> Result<TrackID> {
        let track = Track::new(input, &self.projection, &self.config, self.icons.clone())?;
        let id = track.id().clone();
        if let Some(old) = self.tracks.remove(&id) {
            info!("Replacing track {}", id);
            old.destroy(sink);
            if self.current.as_ref() == Some(&id) {
                self.current = None;
            }
        }
        self.tracks.insert(id.clone(), track);
        Ok(id)
    }

    /// Show a track and make it the target of the playback controls.
    pub fn activate_track(
        &mut self,
        id: &TrackID,
        on_tick: Option<OnTick>,
        sink: &mut dyn RenderSink,
    ) -> Result<()> {
        let track = match self.tracks.get_mut(id) {
            Some(track) => track,
            None => bail!("No track {}", id),
        };
        track.start_up(on_tick)?;
        track.activate(sink);
        info!("Activated track {}", id);
        self.current = Some(id.clone());
        Ok(())
    }

    /// Hide a track, keeping it around to activate later.
    pub fn remove_track(&mut self, id: &TrackID, sink: &mut dyn RenderSink) -> Result<()> {
        match self.tracks.get_mut(id) {
            Some(track) => track.deactivate(sink),
            None => bail!("No track {}", id),
        }
        if self.current.as_ref() == Some(id) {
            self.current = None;
        }
        Ok(())
    }

    pub fn remove_all_tracks(&mut self, sink: &mut dyn RenderSink) {
        for track in self.tracks.values_mut() {
            track.deactivate(sink);
        }
        self.current = None;
    }

    pub fn destroy_track(&mut self, id: &TrackID, sink: &mut dyn RenderSink) -> Result<()> {
        match self.tracks.remove(id) {
            Some(track) => track.destroy(sink),
            None => bail!("No track {}", id),
        }
        if self.current.as_ref() == Some(id) {
            self.current = None;
        }
        Ok(())
    }

    pub fn destroy_all_tracks(&mut self, sink: &mut dyn RenderSink) {
        for (_, track) in std::mem::take(&mut self.tracks) {
            track.destroy(sink);
        }
        self.current = None;
    }

    pub fn track(&self, id: &TrackID) -> Option<&Track> {
        self.tracks.get(id)
    }

    pub fn track_mut(&mut self, id: &TrackID) -> Option<&mut Track> {
        self.tracks.get_mut(id)
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.current.as_ref().and_then(|id| self.tracks.get(id))
    }

    pub fn current_track_mut(&mut self) -> Option<&mut Track> {
        match self.current {
            Some(ref id) => self.tracks.get_mut(id),
            None => None,
        }
    }

    /// Start a live track from its known history. Replaces any live track with the same ID.
    pub fn create_live(
        &mut self,
        id: &str,
        reports: Vec<Report>,
        sink: &mut dyn RenderSink,
    ) -> Result<TrackID> {
        let mut track = RTTrack::new(id, &self.config, self.icons.clone())?;
        // Not on the map yet
        track.init(reports, &self.projection, &mut NullSink)?;
        let id = track.id().clone();
        if let Some(old) = self.live.remove(&id) {
            info!("Replacing live track {}", id);
            old.destroy(sink);
        }
        self.live.insert(id.clone(), track);
        Ok(id)
    }

    pub fn activate_live(
        &mut self,
        id: &TrackID,
        cb: Option<TimerCallback>,
        sink: &mut dyn RenderSink,
    ) -> Result<()> {
        match self.live.get_mut(id) {
            Some(track) => {
                track.set_timer_callback(cb);
                track.activate(sink);
                info!("Activated live track {}", id);
                Ok(())
            }
            None => bail!("No live track {}", id),
        }
    }

    /// Returns true if the report started moving the live track.
    pub fn update_live(
        &mut self,
        id: &TrackID,
        report: Report,
        sink: &mut dyn RenderSink,
    ) -> Result<bool> {
        match self.live.get_mut(id) {
            Some(track) => track.update(report, &self.projection, sink),
            None => bail!("No live track {}", id),
        }
    }

    pub fn remove_live(&mut self, id: &TrackID, sink: &mut dyn RenderSink) -> Result<()> {
        match self.live.get_mut(id) {
            Some(track) => {
                track.deactivate(sink);
                Ok(())
            }
            None => bail!("No live track {}", id),
        }
    }

    pub fn destroy_live(&mut self, id: &TrackID, sink: &mut dyn RenderSink) -> Result<()> {
        match self.live.remove(id) {
            Some(track) => {
                track.destroy(sink);
                Ok(())
            }
            None => bail!("No live track {}", id),
        }
    }

    pub fn destroy_all_live(&mut self, sink: &mut dyn RenderSink) {
        for (_, track) in std::mem::take(&mut self.live) {
            track.destroy(sink);
        }
    }

    pub fn live(&self, id: &TrackID) -> Option<&RTTrack> {
        self.live.get(id)
    }

    pub fn live_mut(&mut self, id: &TrackID) -> Option<&mut RTTrack> {
        self.live.get_mut(id)
    }

    /// One frame for everything on the map.
    pub fn tick(&mut self, sink: &mut dyn RenderSink) {
        for track in self.tracks.values_mut() {
            if track.is_active() {
                track.tick(sink);
            }
        }
        for track in self.live.values_mut() {
            if track.is_active() {
                track.tick(sink);
            }
        }
    }

    /// Is anything on the map still moving?
    pub fn is_busy(&self) -> bool {
        self.tracks
            .values()
            .any(|t| t.is_active() && t.timeline().is_scheduled())
            || self.live.values().any(|t| t.is_active() && t.is_moving())
    }

    pub fn set_coord_system(&mut self, system: CoordSystem, sink: &mut dyn RenderSink) {
        let old_system = self.projection.active();
        if old_system == system {
            return;
        }
        debug!("Switching from {:?} to {:?}", old_system, system);
        self.projection.set_active(system);
        self.config.coord_system = system;
        for track in self.tracks.values_mut() {
            track.reproject(&self.projection, old_system, sink);
        }
        for track in self.live.values_mut() {
            track.reproject(&self.projection, old_system, sink);
        }
    }

    /// The box around every active track of one kind, to fit the view.
    pub fn extent(&self, kind: TrackKind) -> Option<Extent> {
        let extents: Vec<Option<Extent>> = match kind {
            TrackKind::Historical => self
                .tracks
                .values()
                .filter(|t| t.is_active())
                .map(|t| t.extent())
                .collect(),
            TrackKind::Live => self
                .live
                .values()
                .filter(|t| t.is_active())
                .map(|t| t.extent())
                .collect(),
        };
        extents
            .into_iter()
            .flatten()
            .reduce(|a, b| a.union(b))
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn frame_interval(&self) -> std::time::Duration {
        self.config.frame_interval()
    }

    /// Live tracks go first, then historical ones.
    pub fn destroy(mut self, sink: &mut dyn RenderSink) {
        self.destroy_all_live(sink);
        self.destroy_all_tracks(sink);
    }
}
