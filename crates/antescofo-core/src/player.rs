//! Local score playback without an Antescofo engine.
//!
//! [`ScorePlayer`] walks the events of a score in real time at a fixed
//! tempo and hands each event and action to a [`PlaybackSink`]. `BPM`
//! events change the tempo from that point on. Nothing is followed or
//! synthesized here; sinks decide what an event means.

use crate::error::{Error, Result};
use crate::score::ScoreEvent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Longest uninterrupted sleep between stop-flag checks.
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(20);

/// Receives events as the player reaches them.
pub trait PlaybackSink {
    fn on_event(&mut self, event: &ScoreEvent) -> anyhow::Result<()>;

    fn on_action(&mut self, event: &ScoreEvent, action: &str) -> anyhow::Result<()>;
}

/// Sink that logs every event and action.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl PlaybackSink for LogSink {
    fn on_event(&mut self, event: &ScoreEvent) -> anyhow::Result<()> {
        log::info!("[PLAY] {}", event);
        Ok(())
    }

    fn on_action(&mut self, _event: &ScoreEvent, action: &str) -> anyhow::Result<()> {
        log::info!("[PLAY]   action: {}", action);
        Ok(())
    }
}

/// What happened during [`ScorePlayer::play`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackReport {
    pub events_played: usize,
    pub stopped_early: bool,
}

/// Plays score events at a tempo.
#[derive(Debug, Clone)]
pub struct ScorePlayer {
    events: Vec<ScoreEvent>,
    tempo: f64,
}

impl ScorePlayer {
    pub fn new(events: Vec<ScoreEvent>, tempo: f64) -> Result<Self> {
        check_tempo(tempo)?;
        Ok(Self { events, tempo })
    }

    pub fn events(&self) -> &[ScoreEvent] {
        &self.events
    }

    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    pub fn set_tempo(&mut self, tempo: f64) -> Result<()> {
        check_tempo(tempo)?;
        self.tempo = tempo;
        log::info!("Tempo set to {} BPM", tempo);
        Ok(())
    }

    /// Length of `beats` at the current tempo.
    pub fn beats_to_seconds(&self, beats: f64) -> f64 {
        beats * 60.0 / self.tempo
    }

    /// Start time in seconds of every event.
    pub fn timeline(&self) -> Vec<(f64, &ScoreEvent)> {
        let mut tempo = self.tempo;
        let mut now = 0.0;
        let mut out = Vec::with_capacity(self.events.len());
        for event in &self.events {
            if let Some(t) = event.tempo().filter(|t| *t > 0.0) {
                tempo = t;
            }
            out.push((now, event));
            now += event.duration.max(0.0) * 60.0 / tempo;
        }
        out
    }

    pub fn total_duration(&self) -> f64 {
        let mut tempo = self.tempo;
        self.events
            .iter()
            .map(|event| {
                if let Some(t) = event.tempo().filter(|t| *t > 0.0) {
                    tempo = t;
                }
                event.duration.max(0.0) * 60.0 / tempo
            })
            .sum()
    }

    /// Play every event in real time. Blocks until the score ends or
    /// `stop` is set.
    ///
    /// The player's own tempo is left unchanged by `BPM` events.
    pub fn play<S: PlaybackSink>(&self, sink: &mut S, stop: &AtomicBool) -> anyhow::Result<PlaybackReport> {
        log::info!("Playing {} events at {} BPM", self.events.len(), self.tempo);
        let mut tempo = self.tempo;
        let mut report = PlaybackReport {
            events_played: 0,
            stopped_early: false,
        };

        for event in &self.events {
            if stop.load(Ordering::Relaxed) {
                report.stopped_early = true;
                break;
            }
            if let Some(t) = event.tempo().filter(|t| *t > 0.0) {
                log::debug!("Tempo change to {} BPM", t);
                tempo = t;
            }

            sink.on_event(event)?;
            for action in &event.actions {
                sink.on_action(event, action)?;
            }
            report.events_played += 1;

            let seconds = event.duration.max(0.0) * 60.0 / tempo;
            if !sleep_unless_stopped(Duration::from_secs_f64(seconds), stop) {
                report.stopped_early = report.events_played < self.events.len();
                break;
            }
        }

        if report.stopped_early {
            log::info!("Playback stopped after {} events", report.events_played);
        } else {
            log::info!("Playback complete");
        }
        Ok(report)
    }
}

fn check_tempo(tempo: f64) -> Result<()> {
    if tempo.is_finite() && tempo > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "Tempo must be a positive number of BPM, got {}",
            tempo
        )))
    }
}

/// Returns false if `stop` was raised before `duration` elapsed.
fn sleep_unless_stopped(duration: Duration, stop: &AtomicBool) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(STOP_CHECK_INTERVAL));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Default)]
    struct RecordingSink {
        calls: Vec<String>,
        stop_after: Option<(usize, Arc<AtomicBool>)>,
    }

    impl PlaybackSink for RecordingSink {
        fn on_event(&mut self, event: &ScoreEvent) -> anyhow::Result<()> {
            self.calls.push(format!("event {}", event.data));
            if let Some((n, flag)) = &self.stop_after {
                if self.calls.iter().filter(|c| c.starts_with("event")).count() >= *n {
                    flag.store(true, Ordering::Relaxed);
                }
            }
            Ok(())
        }

        fn on_action(&mut self, _event: &ScoreEvent, action: &str) -> anyhow::Result<()> {
            self.calls.push(format!("action {}", action));
            Ok(())
        }
    }

    fn events() -> Vec<ScoreEvent> {
        vec![
            ScoreEvent::new("NOTE", 1.0, "C4 60").with_action("print a"),
            ScoreEvent::new("NOTE", 0.5, "E4 64"),
            ScoreEvent::new("NOTE", 0.5, "G4 67").with_action("print b"),
        ]
    }

    #[test]
    fn test_rejects_bad_tempo() {
        assert!(ScorePlayer::new(events(), 0.0).is_err());
        assert!(ScorePlayer::new(events(), f64::INFINITY).is_err());
        let mut player = ScorePlayer::new(events(), 120.0).unwrap();
        assert!(matches!(player.set_tempo(-1.0), Err(Error::InvalidArgument(_))));
        assert_eq!(player.tempo(), 120.0);
    }

    #[test]
    fn test_timeline() {
        let player = ScorePlayer::new(events(), 120.0).unwrap();
        assert_eq!(player.beats_to_seconds(1.0), 0.5);
        let starts: Vec<f64> = player.timeline().iter().map(|(t, _)| *t).collect();
        assert_eq!(starts, vec![0.0, 0.5, 0.75]);
        assert_eq!(player.total_duration(), 1.0);
    }

    #[test]
    fn test_bpm_events_change_tempo() {
        let mut evs = vec![ScoreEvent::new("BPM", 0.0, "60")];
        evs.extend(events());
        let player = ScorePlayer::new(evs, 120.0).unwrap();
        assert_eq!(player.total_duration(), 2.0);
        assert_eq!(player.timeline()[2].0, 1.0);
    }

    #[test]
    fn test_play_calls_sink_in_order() {
        let player = ScorePlayer::new(events(), 6000.0).unwrap();
        let mut sink = RecordingSink::default();
        let report = player.play(&mut sink, &AtomicBool::new(false)).unwrap();
        assert_eq!(
            sink.calls,
            vec![
                "event C4 60",
                "action print a",
                "event E4 64",
                "event G4 67",
                "action print b"
            ]
        );
        assert_eq!(
            report,
            PlaybackReport {
                events_played: 3,
                stopped_early: false
            }
        );
    }

    #[test]
    fn test_play_stops_early() {
        let player = ScorePlayer::new(events(), 60.0).unwrap();
        let stop = Arc::new(AtomicBool::new(false));
        let mut sink = RecordingSink {
            stop_after: Some((1, stop.clone())),
            ..Default::default()
        };
        let started = Instant::now();
        let report = player.play(&mut sink, &stop).unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(report.events_played, 1);
        assert!(report.stopped_early);
    }

    #[test]
    fn test_sink_errors_abort_playback() {
        struct Failing;
        impl PlaybackSink for Failing {
            fn on_event(&mut self, _event: &ScoreEvent) -> anyhow::Result<()> {
                anyhow::bail!("device gone")
            }
            fn on_action(&mut self, _event: &ScoreEvent, _action: &str) -> anyhow::Result<()> {
                Ok(())
            }
        }
        let player = ScorePlayer::new(events(), 6000.0).unwrap();
        let err = player.play(&mut Failing, &AtomicBool::new(false)).unwrap_err();
        assert_eq!(err.to_string(), "device gone");
    }

    #[test]
    fn test_log_sink() {
        let _ = env_logger::builder().is_test(true).try_init();
        let player = ScorePlayer::new(events(), 6000.0).unwrap();
        let report = player.play(&mut LogSink, &AtomicBool::new(false)).unwrap();
        assert_eq!(report.events_played, 3);
    }
}
