//! `asco score` - generate, inspect and locally play score files.

use anyhow::{Context, Result};
use antescofo_core::score::format_beats;
use antescofo_core::{
    Config, PlaybackSink, ScoreBuilder, ScoreEvent, ScoreFile, ScoreLine, ScorePlayer,
};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Three notes driving the demo PureData synth on `synth_port`.
pub fn demo_score(synth_port: u16) -> ScoreBuilder {
    ScoreBuilder::new()
        .comment("Simple score for the PureData OSC demo")
        .raw(format!(
            "oscsend synth_play localhost : {} \"/synth/play\"",
            synth_port
        ))
        .raw(format!(
            "oscsend synth_stop localhost : {} \"/synth/stop\"",
            synth_port
        ))
        .raw("@global $volume := 0.5")
        .raw("")
        .comment("--- NOTE 1 ---")
        .event("NOTE", Some(1.0), Some("C4 60"))
        .action("synth_play 440 $volume")
        .action("print \"Action 1 triggered: playing C4\"")
        .comment("--- NOTE 2 ---")
        .event("NOTE", Some(1.0), Some("E4 64"))
        .action("synth_play 660 $volume")
        .action("print \"Action 2 triggered: playing E4\"")
        .comment("--- NOTE 3 ---")
        .event("NOTE", Some(0.5), Some("G4 67"))
        .action("print \"Score finished.\"")
        .action("synth_stop 0")
}

pub fn demo(out: &Path, config: &Config) -> Result<()> {
    demo_score(config.synth.pd_listen_port).save(out)?;
    println!("Generated demo score: {}", out.display());
    Ok(())
}

/// Line counts of a parsed score.
#[derive(Debug, Default, PartialEq)]
pub struct ScoreSummary {
    pub events: usize,
    pub actions: usize,
    pub comments: usize,
    pub inserts: Vec<String>,
    pub declarations: usize,
    pub other: usize,
    /// Problems found, with 1-based line numbers
    pub problems: Vec<String>,
}

pub fn summarize(score: &ScoreFile) -> ScoreSummary {
    let mut summary = ScoreSummary::default();
    let mut open_ifs: Vec<usize> = Vec::new();
    let mut seen_event = false;

    for (index, line) in score.parse().into_iter().enumerate() {
        let number = index + 1;
        match line {
            ScoreLine::Blank => {}
            ScoreLine::Comment(_) => summary.comments += 1,
            ScoreLine::Insert { path, .. } => summary.inserts.push(path),
            ScoreLine::Declaration(_) => summary.declarations += 1,
            ScoreLine::Event(_) => {
                seen_event = true;
                summary.events += 1;
            }
            ScoreLine::Action(action) => {
                summary.actions += 1;
                if !seen_event && open_ifs.is_empty() {
                    summary
                        .problems
                        .push(format!("line {}: action before any event: {}", number, action));
                }
            }
            ScoreLine::Preprocessor(directive) => {
                let keyword = directive.split_whitespace().next().unwrap_or_default();
                match keyword {
                    "#if" | "#ifdef" | "#ifndef" => open_ifs.push(number),
                    "#endif" => {
                        if open_ifs.pop().is_none() {
                            summary
                                .problems
                                .push(format!("line {}: #endif without #if", number));
                        }
                    }
                    "#else" | "#elif" if open_ifs.is_empty() => summary
                        .problems
                        .push(format!("line {}: {} without #if", number, keyword)),
                    _ => {}
                }
            }
            ScoreLine::Raw(_) => summary.other += 1,
        }
    }
    for number in open_ifs {
        summary
            .problems
            .push(format!("line {}: #if is never closed", number));
    }
    summary
}

pub fn check(path: &Path) -> Result<()> {
    let score = ScoreFile::load(path)?;
    let summary = summarize(&score);

    println!("{}", path.display());
    println!("  {} lines", score.len());
    println!("  {} events, {} actions", summary.events, summary.actions);
    println!(
        "  {} comments, {} declarations, {} other lines",
        summary.comments, summary.declarations, summary.other
    );
    for insert in &summary.inserts {
        println!("  includes {}", insert);
    }
    for event in score.events() {
        println!("    {} ({} actions)", event, event.actions.len());
    }

    if summary.problems.is_empty() {
        println!("OK");
        Ok(())
    } else {
        for problem in &summary.problems {
            println!("  problem: {}", problem);
        }
        anyhow::bail!("{} problem(s) in {}", summary.problems.len(), path.display())
    }
}

/// Prints events and actions as they play.
struct PrintSink;

impl PlaybackSink for PrintSink {
    fn on_event(&mut self, event: &ScoreEvent) -> Result<()> {
        println!("{} {} {}", event.kind, format_beats(event.duration), event.data);
        Ok(())
    }

    fn on_action(&mut self, _event: &ScoreEvent, action: &str) -> Result<()> {
        println!("    -> {}", action);
        Ok(())
    }
}

pub fn play(path: &Path, tempo: f64, stop: Arc<AtomicBool>) -> Result<()> {
    let score = ScoreFile::load(path)?;
    let player = ScorePlayer::new(score.events(), tempo)?;
    println!(
        "Playing {} ({} events, {:.1}s at {} BPM, Ctrl+C to stop)",
        path.display(),
        player.events().len(),
        player.total_duration(),
        tempo
    );

    let report = player
        .play(&mut PrintSink, &stop)
        .context("Playback failed")?;
    if report.stopped_early {
        println!("Stopped after {} events", report.events_played);
    } else {
        println!("Playback complete");
    }
    Ok(())
}
