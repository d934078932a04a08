use std::fmt;

use anyhow::Result;
use geom::Distance;

use crate::{Algorithm, Coord, Mover, PlaybackConfig, Point, RenderSink};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Uninitialized,
    Initialized,
    Playing,
    Paused,
    Stopped,
}

const MAX_SPEED_EXPONENT: i32 = 5;

/// A playback multiplier, always a power of two between 1/32x and 32x.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Speed {
    exponent: i32,
}

impl Speed {
    pub const NORMAL: Speed = Speed { exponent: 0 };

    pub fn faster(self) -> Self {
        Self {
            exponent: (self.exponent + 1).min(MAX_SPEED_EXPONENT),
        }
    }

    pub fn slower(self) -> Self {
        Self {
            exponent: (self.exponent - 1).max(-MAX_SPEED_EXPONENT),
        }
    }

    pub fn multiplier(self) -> f64 {
        2.0_f64.powi(self.exponent)
    }
}

/// "4" when faster than normal, "1/4" when slower
impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.exponent >= 0 {
            write!(f, "{}", 1_u32 << self.exponent)
        } else {
            write!(f, "1/{}", 1_u32 << -self.exponent)
        }
    }
}

/// Called after every tick that did something. It can look, but not touch.
pub type OnTick = Box<dyn FnMut(&TimeLine)>;

/// The pair of points currently being animated. While this exists, ticks do something; stopping
/// drops it.
#[derive(Clone, Copy, Debug)]
struct Player {
    /// The pair is `path[index]` to `path[index + 1]`
    index: usize,
    algorithm: Algorithm,
    /// The time between the two points exceeds the max gap
    over_gap: bool,
    /// Ticks left to reach the end of the pair, as of the last tick
    remaining: f64,
}

/// Moves a mover along a path, one tick at a time.
pub struct TimeLine {
    state: State,
    path: Vec<Point>,
    config: PlaybackConfig,
    speed: Speed,
    current_index: usize,
    current_time: i64,
    start_time: i64,
    end_time: i64,
    player: Option<Player>,
    on_tick: Option<OnTick>,
}

impl TimeLine {
    pub fn new(config: PlaybackConfig) -> Self {
        Self {
            state: State::Uninitialized,
            path: Vec::new(),
            config,
            speed: Speed::NORMAL,
            current_index: 0,
            current_time: 0,
            start_time: 0,
            end_time: 0,
            player: None,
            on_tick: None,
        }
    }

    /// The path must be non-empty and sorted by time.
    pub fn init(&mut self, path: Vec<Point>, on_tick: Option<OnTick>) -> Result<()> {
        if path.is_empty() {
            bail!("Can't play an empty path");
        }
        for pair in path.windows(2) {
            if pair[0].time > pair[1].time {
                bail!(
                    "Path input out-of-order: {} then {}",
                    pair[0].time,
                    pair[1].time
                );
            }
        }
        self.start_time = path[0].time;
        self.end_time = path[path.len() - 1].time;
        self.current_index = 0;
        self.current_time = self.start_time;
        self.path = path;
        self.player = None;
        self.on_tick = on_tick;
        self.state = State::Initialized;
        Ok(())
    }

    /// Starts from the beginning the first time or after stopping; otherwise resumes.
    pub fn play(&mut self, mover: &mut Mover, sink: &mut dyn RenderSink) {
        match self.state {
            State::Uninitialized => warn!("Can't play a timeline before it's initialized"),
            State::Initialized => self.start(mover, sink),
            State::Stopped => self.restart(mover, sink),
            State::Playing | State::Paused => {
                self.state = State::Playing;
                if self.player.is_none() && self.path.len() > 1 {
                    let idx = self.binary_search(self.current_time);
                    self.start_pair(idx, mover, sink);
                }
            }
        }
    }

    /// Ticks keep coming while paused, they just don't do anything, so resuming continues from
    /// exactly the same place.
    pub fn pause(&mut self) {
        if self.state == State::Playing {
            self.state = State::Paused;
        }
    }

    pub fn stop(&mut self, mover: &mut Mover, sink: &mut dyn RenderSink) {
        if self.state == State::Uninitialized {
            return;
        }
        self.player = None;
        mover.update(self.path[0].pt, sink);
        self.state = State::Stopped;
    }

    pub fn restart(&mut self, mover: &mut Mover, sink: &mut dyn RenderSink) {
        if self.state == State::Uninitialized {
            warn!("Can't restart a timeline before it's initialized");
            return;
        }
        self.stop(mover, sink);
        self.current_index = 0;
        self.current_time = self.start_time;
        self.start(mover, sink);
    }

    fn start(&mut self, mover: &mut Mover, sink: &mut dyn RenderSink) {
        self.speed = Speed::NORMAL;
        if self.path.len() < 2 {
            // Nowhere to go
            mover.update(self.path[0].pt, sink);
            self.state = State::Stopped;
            self.fire();
            return;
        }
        self.start_pair(self.current_index, mover, sink);
        self.state = State::Playing;
    }

    pub fn speed_up(&mut self) -> Speed {
        self.speed = self.speed.faster();
        self.speed
    }

    pub fn speed_down(&mut self) -> Speed {
        self.speed = self.speed.slower();
        self.speed
    }

    /// Only when moving by time
    pub fn seek_forward(&mut self) {
        if let Some(jump) = self.seek_jump() {
            self.current_time = (self.current_time + jump).min(self.end_time);
        }
    }

    /// Only when moving by time
    pub fn seek_backward(&mut self) {
        if let Some(jump) = self.seek_jump() {
            self.current_time = (self.current_time - jump).max(self.start_time);
        }
    }

    fn seek_jump(&self) -> Option<i64> {
        if self.state == State::Uninitialized {
            return None;
        }
        if self.algorithm() == Algorithm::ByDistance {
            warn!("Seeking only works when moving by time");
            return None;
        }
        Some(
            (self.time_step() as f64 * self.config.seek_frames * self.config.frame_interval_ms)
                .floor() as i64,
        )
    }

    /// Finds `i` such that `path[i].time < time <= path[i + 1].time`. Anything at or before the
    /// first point is 0, and anything past the end is the last pair.
    pub fn binary_search(&self, time: i64) -> usize {
        let before = self.path.partition_point(|pt| pt.time < time);
        before
            .saturating_sub(1)
            .min(self.path.len().saturating_sub(2))
    }

    /// Where the mover should be at the current time, interpolating within the current pair.
    pub fn calculate_position(&self) -> Coord {
        if self.path.len() < 2 {
            return self.path[0].pt;
        }
        self.position_at(self.current_index, self.current_time)
    }

    fn position_at(&self, idx: usize, time: i64) -> Coord {
        let from = &self.path[idx];
        let to = &self.path[idx + 1];
        let total = to.time - from.time;
        if total <= 0 {
            return to.pt;
        }
        let pct = ((time - from.time) as f64 / total as f64).clamp(0.0, 1.0);
        from.pt.lerp(to.pt, pct)
    }

    /// Begin animating `path[idx]` to `path[idx + 1]`, replacing whatever pair was in flight.
    fn start_pair(&mut self, idx: usize, mover: &mut Mover, sink: &mut dyn RenderSink) {
        let idx = idx.min(self.path.len() - 2);
        let from = self.path[idx];
        let to = self.path[idx + 1];
        let algorithm = self.config.algorithm;
        let over_gap = to.time - from.time > self.config.max_gap_ms;

        let remaining = match algorithm {
            Algorithm::ByTime => {
                (to.time - self.current_time.max(from.time)) as f64 / self.time_step() as f64
            }
            Algorithm::ByDistance => {
                self.config.metric.distance(from.pt, to.pt) / self.distance_step()
            }
        };
        let pt = if over_gap || algorithm == Algorithm::ByDistance {
            from.pt
        } else {
            self.position_at(idx, self.current_time)
        };

        self.current_index = idx;
        mover.update(pt, sink);
        self.player = Some(Player {
            index: idx,
            algorithm,
            over_gap,
            remaining,
        });
        debug!(
            "Starting pair {} of {} ({} ticks, over gap: {})",
            idx,
            self.path.len() - 1,
            remaining.ceil(),
            over_gap
        );
    }

    /// Advance one frame. Does nothing unless playing.
    pub fn tick(&mut self, mover: &mut Mover, sink: &mut dyn RenderSink) {
        let player = match self.player {
            Some(player) => player,
            None => return,
        };
        if self.state != State::Playing || self.path.len() < 2 {
            return;
        }
        match player.algorithm {
            Algorithm::ByTime => self.advance_by_time(player, mover, sink),
            Algorithm::ByDistance => self.advance_by_distance(player, mover, sink),
        }
        self.fire();
    }

    fn advance_by_time(&mut self, player: Player, mover: &mut Mover, sink: &mut dyn RenderSink) {
        let idx = player.index;
        let from = self.path[idx];
        let to = self.path[idx + 1];

        if self.current_time < from.time || self.current_time > to.time {
            // Seeking moved us out of this pair
            let idx = self.binary_search(self.current_time);
            self.start_pair(idx, mover, sink);
            return;
        }
        if player.over_gap {
            // Nothing to see during a blackout, so get through it quickly
            self.current_time += self.config.time_step_ms * self.config.gap_speed_up;
        } else {
            self.current_time += self.time_step();
        }

        if self.current_time >= self.end_time {
            self.finish(mover, sink);
            return;
        }
        if self.current_time > to.time {
            let idx = self.binary_search(self.current_time);
            self.start_pair(idx, mover, sink);
            return;
        }

        if !player.over_gap {
            mover.update(self.position_at(idx, self.current_time), sink);
        }
        let remaining = (to.time - self.current_time) as f64 / self.time_step() as f64;
        if let Some(ref mut p) = self.player {
            p.remaining = remaining;
        }
    }

    fn advance_by_distance(
        &mut self,
        player: Player,
        mover: &mut Mover,
        sink: &mut dyn RenderSink,
    ) {
        let idx = player.index;
        let to = self.path[idx + 1];
        // Measure from wherever the mover really is, not where it should be
        let here = mover.coordinate().unwrap_or(self.path[idx].pt);
        let remaining = if player.over_gap {
            player.remaining
        } else {
            self.config.metric.distance(here, to.pt) / self.distance_step()
        };

        if remaining <= 1.0 {
            self.current_time = to.time;
            if idx + 2 >= self.path.len() {
                self.finish(mover, sink);
            } else {
                mover.update(to.pt, sink);
                self.start_pair(idx + 1, mover, sink);
            }
            return;
        }

        if !player.over_gap {
            mover.update(
                here.offset(
                    (to.pt.x - here.x) / remaining,
                    (to.pt.y - here.y) / remaining,
                ),
                sink,
            );
        }
        self.current_time = (self.current_time as f64
            + (to.time - self.current_time) as f64 / remaining)
            .floor() as i64;
        if let Some(ref mut p) = self.player {
            p.remaining = remaining - 1.0;
        }
    }

    fn finish(&mut self, mover: &mut Mover, sink: &mut dyn RenderSink) {
        self.current_time = self.end_time;
        self.current_index = self.path.len() - 2;
        mover.update(self.path[self.path.len() - 1].pt, sink);
        self.player = None;
        self.state = State::Stopped;
        info!(
            "Finished playing {} points from {} to {}",
            self.path.len(),
            self.start_time,
            self.end_time
        );
    }

    fn fire(&mut self) {
        if let Some(mut cb) = self.on_tick.take() {
            cb(self);
            self.on_tick = Some(cb);
        }
    }

    /// After re-projecting, swap in the same points with new coordinates. Times must not change.
    pub(crate) fn replace_path(&mut self, path: Vec<Point>) {
        if self.state != State::Uninitialized && path.len() == self.path.len() {
            self.path = path;
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current_time(&self) -> i64 {
        self.current_time
    }

    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    pub fn end_time(&self) -> i64 {
        self.end_time
    }

    pub fn path(&self) -> &[Point] {
        &self.path
    }

    pub fn speed(&self) -> Speed {
        self.speed
    }

    pub fn max_gap_ms(&self) -> i64 {
        self.config.max_gap_ms
    }

    pub fn frame_interval_ms(&self) -> f64 {
        self.config.frame_interval_ms
    }

    /// Path time covered per tick
    pub fn time_step(&self) -> i64 {
        ((self.config.time_step_ms as f64 * self.speed.multiplier()).round() as i64).max(1)
    }

    /// Distance covered per tick
    pub fn distance_step(&self) -> Distance {
        Distance::meters(self.config.distance_step_meters * self.speed.multiplier())
    }

    /// The algorithm of the pair in flight, or the one the next pair will use
    pub fn algorithm(&self) -> Algorithm {
        match self.player {
            Some(player) => player.algorithm,
            None => self.config.algorithm,
        }
    }

    /// Takes effect from the next pair.
    pub fn set_algorithm(&mut self, algorithm: Algorithm) {
        self.config.algorithm = algorithm;
    }

    /// Ticks left in the pair being animated
    pub fn remaining_ticks(&self) -> Option<f64> {
        self.player.map(|p| p.remaining)
    }

    /// Is a pair in flight? Pausing doesn't change this; stopping does.
    pub fn is_scheduled(&self) -> bool {
        self.player.is_some()
    }
}
