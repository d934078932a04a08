use serde::{Deserialize, Serialize};

use crate::{CoordSystem, Metric};

/// How a timeline moves its mover each tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
    /// Advance a fixed amount of time and interpolate the position
    ByTime,
    /// Advance a fixed distance towards the next point
    ByDistance,
}

impl Default for Algorithm {
    fn default() -> Self {
        Algorithm::ByTime
    }
}

/// Every knob of the engine. Anything missing from a config file takes its default.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Real time between two ticks
    pub frame_interval_ms: f64,
    /// Successive points further apart than this belong to different segments
    pub max_gap_ms: i64,
    /// How far the mover travels per tick at 1x, when moving by distance
    pub distance_step_meters: f64,
    /// How much path time passes per tick at 1x, when moving by time
    pub time_step_ms: i64,
    /// Multiplier of the default time step while crossing a gap
    pub gap_speed_up: i64,
    /// Seeking jumps this many frames' worth of the current time step
    pub seek_frames: f64,
    /// How many ticks a live update takes to glide to its new position
    pub tween_frames: usize,
    pub algorithm: Algorithm,
    pub metric: Metric,
    /// The system the map renders in
    pub coord_system: CoordSystem,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 1000.0 / 60.0,
            max_gap_ms: 30 * 60 * 1000,
            distance_step_meters: 0.5 / 4.0,
            time_step_ms: 256,
            gap_speed_up: 128,
            seek_frames: 40.0,
            // 30 seconds at 60 frames per second
            tween_frames: 30 * 60,
            algorithm: Algorithm::ByTime,
            metric: Metric::Geodesic,
            coord_system: CoordSystem::Gcj02,
        }
    }
}

impl PlaybackConfig {
    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.frame_interval_ms / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config() {
        let config: PlaybackConfig =
            serde_json::from_str(r#"{"max_gap_ms": 1000, "algorithm": "ByDistance"}"#).unwrap();
        assert_eq!(config.max_gap_ms, 1000);
        assert_eq!(config.algorithm, Algorithm::ByDistance);
        assert_eq!(config.time_step_ms, 256);
        assert_eq!(config.tween_frames, 1800);
    }
}
