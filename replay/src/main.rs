#[macro_use]
extern crate anyhow;
#[macro_use]
extern crate log;

mod load;

use std::collections::BTreeMap;

use abstutil::prettyprint_usize;
use anyhow::Result;
use chrono::{TimeZone, Utc};
use structopt::StructOpt;

use playback::{
    widen_timestamp, Algorithm, Coord, IconRef, IconTable, IdentityTransform, OnTick,
    PlaybackConfig, RTTrack, RenderHandle, RenderSink, TimeLine, TimerCallback, Track, Tracker,
};

use self::load::Record;

#[derive(StructOpt)]
struct Args {
    /// The path to a CSV file with columns source,x,y,time and optionally system,kind
    #[structopt(long)]
    input: String,
    /// The path to a JSON file overriding any playback settings
    #[structopt(long)]
    config: Option<String>,
    /// Move a fixed distance every frame, instead of a fixed amount of time
    #[structopt(long)]
    by_distance: bool,
    /// Double the speed this many times; negative values halve it
    #[structopt(long, default_value = "0")]
    speed: i32,
    /// Sleep between frames, like a real map would
    #[structopt(long)]
    realtime: bool,
    /// Feed records one at a time into live tracks, instead of playing back history
    #[structopt(long)]
    live: bool,
}

fn main() {
    abstutil::logger::setup();

    let args = Args::from_iter(abstutil::cli_args());
    if let Err(err) = run(args) {
        error!("{:?}", err);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let mut config = match args.config {
        Some(ref path) => serde_json::from_str(&fs_err::read_to_string(path)?)?,
        None => PlaybackConfig::default(),
    };
    if args.by_distance {
        config.algorithm = Algorithm::ByDistance;
    }
    if args.live && config.tween_frames == 0 {
        bail!("tween_frames must be positive");
    }

    let records = load::load(fs_err::File::open(&args.input)?)?;
    if records.is_empty() {
        bail!("{} has no records", args.input);
    }

    let mut sink = CountingSink::default();
    let mut tracker = Tracker::new(config, IdentityTransform, IconTable::builtin());
    if args.live {
        replay_live(&mut tracker, records, args.realtime, &mut sink)?;
    } else {
        replay_history(&mut tracker, records, args.speed, args.realtime, &mut sink)?;
    }
    tracker.destroy(&mut sink);
    sink.summarize();
    Ok(())
}

fn replay_history(
    tracker: &mut Tracker,
    records: BTreeMap<String, Vec<Record>>,
    speed: i32,
    realtime: bool,
    sink: &mut CountingSink,
) -> Result<()> {
    let mut ids = Vec::new();
    for (source, records) in records {
        let id = tracker.create_track(load::to_track_input(&source, &records)?, sink)?;
        let mut frames = 0;
        let name = id.clone();
        let on_tick: OnTick = Box::new(move |timeline: &TimeLine| {
            frames += 1;
            if frames % 600 == 0 {
                info!(
                    "{} is at {} after {} frames",
                    name,
                    describe_time(timeline.current_time()),
                    prettyprint_usize(frames)
                );
            }
        });
        tracker.activate_track(&id, Some(on_tick), sink)?;
        ids.push(id);
    }

    for id in &ids {
        if let Some(track) = tracker.track_mut(id) {
            let timeline = track.timeline();
            info!(
                "Playing {} from {} to {}",
                id,
                describe_time(timeline.start_time()),
                describe_time(timeline.end_time())
            );
            track.play(sink);
            set_speed(track, speed);
            info!("{} plays at {}x", id, track.timeline().speed());
        }
    }

    let frames = run_frames(tracker, realtime, sink);
    info!("All tracks finished after {} frames", prettyprint_usize(frames));
    Ok(())
}

fn replay_live(
    tracker: &mut Tracker,
    records: BTreeMap<String, Vec<Record>>,
    realtime: bool,
    sink: &mut CountingSink,
) -> Result<()> {
    let mut dropped = 0;
    for (source, records) in records {
        let first = match records.first() {
            Some(rec) => rec.to_report(),
            None => continue,
        };
        let id = tracker.create_live(&source, vec![first], sink)?;
        let cb: TimerCallback = Box::new(|track: &RTTrack| {
            trace!("{} has {} working points", track.id(), track.working_path().len());
        });
        tracker.activate_live(&id, Some(cb), sink)?;

        for rec in records.iter().skip(1) {
            if !tracker.update_live(&id, rec.to_report(), sink)? {
                dropped += 1;
                continue;
            }
            let frames = run_frames(tracker, realtime, sink);
            debug!(
                "{} reached the report from {} after {} frames",
                id,
                describe_time(rec.time),
                frames
            );
        }
        if let Some(track) = tracker.live(&id) {
            info!("Live track {} ended with {} points", id, track.path().len());
        }
    }
    info!("{} reports were ignored", prettyprint_usize(dropped));
    Ok(())
}

/// Double or halve the speed some number of times. The engine stops at 5 either way.
fn set_speed(track: &mut Track, speed: i32) {
    let speed = speed.clamp(-5, 5);
    for _ in 0..speed.abs() {
        if speed > 0 {
            track.speed_up();
        } else {
            track.speed_down();
        }
    }
}

/// Tick until nothing moves anymore. Returns the number of frames.
fn run_frames(tracker: &mut Tracker, realtime: bool, sink: &mut CountingSink) -> usize {
    let mut frames = 0;
    while tracker.is_busy() {
        tracker.tick(sink);
        frames += 1;
        if realtime {
            std::thread::sleep(tracker.frame_interval());
        }
    }
    frames
}

fn describe_time(time: i64) -> String {
    // Seconds since the epoch get widened the same way the engine does it
    match Utc.timestamp_millis_opt(widen_timestamp(time)).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
        None => format!("{}ms", time),
    }
}

/// Doesn't draw anything; just counts what a map would've been asked to do.
#[derive(Default)]
struct CountingSink {
    attached: usize,
    detached: usize,
    positions: usize,
    polylines: usize,
    icons: usize,
}

impl CountingSink {
    fn summarize(&self) {
        info!("Render sink calls:");
        info!("  attach: {}", prettyprint_usize(self.attached));
        info!("  detach: {}", prettyprint_usize(self.detached));
        info!("  set_position: {}", prettyprint_usize(self.positions));
        info!("  set_polyline: {}", prettyprint_usize(self.polylines));
        info!("  set_icon: {}", prettyprint_usize(self.icons));
    }
}

impl RenderSink for CountingSink {
    fn attach(&mut self, handle: &RenderHandle) {
        trace!("attach {:?}", handle);
        self.attached += 1;
    }

    fn detach(&mut self, handle: &RenderHandle) {
        trace!("detach {:?}", handle);
        self.detached += 1;
    }

    fn set_position(&mut self, _: &RenderHandle, _: Coord) {
        self.positions += 1;
    }

    fn set_polyline(&mut self, _: &RenderHandle, _: &[Coord]) {
        self.polylines += 1;
    }

    fn set_icon(&mut self, handle: &RenderHandle, icon: &IconRef) {
        trace!("{:?} now looks like {}", handle, icon.0);
        self.icons += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use playback::{CoordSystem, Projection, RawPoint, TrackInput};

    use super::*;

    fn track() -> Track {
        Track::new(
            TrackInput {
                source_id: Some("1".to_string()),
                category: Default::default(),
                kind: Default::default(),
                points: vec![RawPoint::new(0.0, 0.0, 0), RawPoint::new(1.0, 0.0, 1000)],
            },
            &Projection::identity(CoordSystem::Gcj02),
            &PlaybackConfig::default(),
            Rc::new(IconTable::builtin()),
        )
        .unwrap()
    }

    #[test]
    fn extreme_speeds() {
        let mut fast = track();
        set_speed(&mut fast, i32::MAX);
        assert_eq!(fast.timeline().speed().to_string(), "32");

        let mut slow = track();
        set_speed(&mut slow, i32::MIN);
        assert_eq!(slow.timeline().speed().to_string(), "1/32");
    }

    #[test]
    fn times() {
        assert_eq!(describe_time(1502380680), "2017-08-10 15:58:00.000");
        assert_eq!(describe_time(1502380680500), "2017-08-10 15:58:00.500");
        // Already milliseconds
        assert_eq!(describe_time(11_000), "1970-01-01 00:00:11.000");
    }
}
