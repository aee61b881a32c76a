//! Antescofo score files.
//!
//! Scores are line-oriented text: musical events (`NOTE 1.0 C4 60`) at the
//! left margin, each followed by its indented actions, plus comments,
//! `@` declarations and `#if`/`#else`/`#endif` preprocessor blocks.
//!
//! [`ScoreFile`] holds the lines and knows how to emit each construct,
//! [`ScoreBuilder`] offers the same operations as a chain, and
//! [`ScoreFile::parse`] / [`ScoreFile::events`] read a score back.

use crate::constants::SCORE_EVENT_KEYWORDS;
use crate::error::{Error, Result};
use regex::Regex;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

static INSERT_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"^@insert(_once)?\s+(?:"([^"]*)"|(\S+))\s*$"#).ok());

/// Format a beat count so it always carries a decimal (`1.0`, `0.5`).
pub fn format_beats(beats: f64) -> String {
    if beats.fract() == 0.0 && beats.is_finite() {
        format!("{:.1}", beats)
    } else {
        beats.to_string()
    }
}

/// An Antescofo score as an ordered list of lines.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreFile {
    lines: Vec<String>,
}

impl ScoreFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split `content` on newlines. Empty content gives an empty score.
    pub fn from_content(content: &str) -> Self {
        if content.is_empty() {
            return Self::new();
        }
        Self {
            lines: content.split('\n').map(str::to_string).collect(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Score(format!("Failed to load score from {}: {}", path.display(), e))
        })?;
        log::info!("Loaded score from {}", path.display());
        Ok(Self::from_content(&content))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.content()).map_err(|e| {
            Error::Score(format!("Failed to save score to {}: {}", path.display(), e))
        })?;
        log::info!("Saved score to {}", path.display());
        Ok(())
    }

    pub fn append(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    /// Insert a line before `index`; indices past the end append.
    pub fn insert(&mut self, index: usize, line: impl Into<String>) {
        let index = index.min(self.lines.len());
        self.lines.insert(index, line.into());
    }

    /// Append an `@insert` directive.
    pub fn insert_file(&mut self, path: impl AsRef<Path>, quote_if_spaces: bool) {
        self.append(include_directive("@insert", path.as_ref(), quote_if_spaces));
    }

    /// Append an `@insert_once` directive.
    pub fn insert_file_once(&mut self, path: impl AsRef<Path>, quote_if_spaces: bool) {
        self.append(include_directive("@insert_once", path.as_ref(), quote_if_spaces));
    }

    pub fn add_comment(&mut self, comment: &str) {
        self.append(format!("; {}", comment));
    }

    /// Append an event line: `KIND [duration] [attributes]`.
    pub fn add_event(&mut self, kind: &str, duration: Option<f64>, attributes: Option<&str>) {
        let mut parts = vec![kind.to_string()];
        if let Some(duration) = duration {
            parts.push(format_beats(duration));
        }
        if let Some(attributes) = attributes.filter(|a| !a.is_empty()) {
            parts.push(attributes.to_string());
        }
        self.append(parts.join(" "));
    }

    /// Append an action, indented under the preceding event.
    pub fn add_action(&mut self, action: &str) {
        self.append(format!("    {}", action));
    }

    /// Append an `#if` block, with an optional `#else` branch.
    pub fn add_conditional(&mut self, condition: &str, if_block: &str, else_block: Option<&str>) {
        self.append(format!("#if {}", condition));
        for line in if_block.split('\n') {
            self.append(format!("  {}", line));
        }
        if let Some(else_block) = else_block.filter(|b| !b.is_empty()) {
            self.append("#else");
            for line in else_block.split('\n') {
                self.append(format!("  {}", line));
            }
        }
        self.append("#endif");
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn content(&self) -> String {
        self.lines.join("\n")
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Classify every line.
    pub fn parse(&self) -> Vec<ScoreLine> {
        self.lines.iter().map(|l| ScoreLine::parse(l)).collect()
    }

    /// Musical events with the actions that follow them.
    ///
    /// Actions appearing before the first event are ignored.
    pub fn events(&self) -> Vec<ScoreEvent> {
        let mut events: Vec<ScoreEvent> = Vec::new();
        for line in self.parse() {
            match line {
                ScoreLine::Event(event) => events.push(ScoreEvent {
                    kind: event.kind,
                    duration: event.duration.unwrap_or(0.0),
                    data: event.attributes,
                    actions: Vec::new(),
                }),
                ScoreLine::Action(action) => match events.last_mut() {
                    Some(current) => current.actions.push(action),
                    None => log::debug!("Ignoring action before first event: {}", action),
                },
                _ => {}
            }
        }
        events
    }
}

fn include_directive(directive: &str, path: &Path, quote_if_spaces: bool) -> String {
    let path = path.to_string_lossy();
    if quote_if_spaces && path.contains(' ') {
        format!("{} \"{}\"", directive, path)
    } else {
        format!("{} {}", directive, path)
    }
}

impl fmt::Display for ScoreFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content())
    }
}

/// An event line as written in the score.
#[derive(Debug, Clone, PartialEq)]
pub struct EventLine {
    pub kind: String,
    /// Duration in beats, when the line has one
    pub duration: Option<f64>,
    /// Everything after the duration
    pub attributes: String,
}

/// One classified score line.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreLine {
    Blank,
    /// Comment text without its `;` or `//` marker
    Comment(String),
    Insert { path: String, once: bool },
    /// Any other `@` line (`@global`, `@macro_def`, ...)
    Declaration(String),
    /// `#if`, `#else`, `#endif`
    Preprocessor(String),
    Event(EventLine),
    /// Indented action, trimmed
    Action(String),
    Raw(String),
}

impl ScoreLine {
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return ScoreLine::Blank;
        }
        if let Some(text) = trimmed.strip_prefix(';').or_else(|| trimmed.strip_prefix("//")) {
            return ScoreLine::Comment(text.trim().to_string());
        }

        let indented = line.starts_with(char::is_whitespace);
        if indented {
            return ScoreLine::Action(trimmed.to_string());
        }

        if trimmed.starts_with('@') {
            return parse_insert(trimmed)
                .unwrap_or_else(|| ScoreLine::Declaration(trimmed.to_string()));
        }
        if trimmed.starts_with('#') {
            return ScoreLine::Preprocessor(trimmed.to_string());
        }

        parse_event(trimmed).map_or_else(|| ScoreLine::Raw(trimmed.to_string()), ScoreLine::Event)
    }
}

fn parse_insert(line: &str) -> Option<ScoreLine> {
    let caps = INSERT_PATTERN.as_ref()?.captures(line)?;
    let path = caps.get(2).or_else(|| caps.get(3))?.as_str().to_string();
    Some(ScoreLine::Insert {
        path,
        once: caps.get(1).is_some(),
    })
}

fn parse_event(line: &str) -> Option<EventLine> {
    let (keyword, rest) = match line.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword, rest.trim()),
        None => (line, ""),
    };
    let kind = keyword.to_ascii_uppercase();
    if !SCORE_EVENT_KEYWORDS.contains(&kind.as_str()) {
        return None;
    }

    // BPM carries a tempo, not a duration
    if kind == "BPM" {
        return Some(EventLine {
            kind,
            duration: None,
            attributes: rest.to_string(),
        });
    }

    let (first, after) = match rest.split_once(char::is_whitespace) {
        Some((first, after)) => (first, after.trim()),
        None => (rest, ""),
    };
    let (duration, attributes) = match first.parse::<f64>() {
        Ok(d) => (Some(d), after),
        Err(_) => (None, rest),
    };
    Some(EventLine {
        kind,
        duration,
        attributes: attributes.to_string(),
    })
}

/// A musical event together with its actions.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreEvent {
    pub kind: String,
    /// Duration in beats (0 when the line has none)
    pub duration: f64,
    pub data: String,
    pub actions: Vec<String>,
}

impl ScoreEvent {
    pub fn new(kind: impl Into<String>, duration: f64, data: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            duration,
            data: data.into(),
            actions: Vec::new(),
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.actions.push(action.into());
        self
    }

    /// Tempo of a `BPM` event.
    pub fn tempo(&self) -> Option<f64> {
        if self.kind != "BPM" {
            return None;
        }
        self.data.split_whitespace().next()?.parse().ok()
    }
}

impl fmt::Display for ScoreEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, format_beats(self.duration))?;
        if !self.data.is_empty() {
            write!(f, " {}", self.data)?;
        }
        Ok(())
    }
}

/// Chainable score construction.
///
/// ```
/// use antescofo_core::ScoreBuilder;
///
/// let score = ScoreBuilder::new()
///     .comment("My Score")
///     .event("NOTE", Some(1.0), Some("C4 60"))
///     .action("print Hello")
///     .build();
/// assert_eq!(score.content(), "; My Score\nNOTE 1.0 C4 60\n    print Hello");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ScoreBuilder {
    score: ScoreFile,
}

impl ScoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn comment(mut self, text: &str) -> Self {
        self.score.add_comment(text);
        self
    }

    pub fn event(mut self, kind: &str, duration: Option<f64>, attributes: Option<&str>) -> Self {
        self.score.add_event(kind, duration, attributes);
        self
    }

    pub fn action(mut self, action: &str) -> Self {
        self.score.add_action(action);
        self
    }

    pub fn insert(mut self, path: impl AsRef<Path>) -> Self {
        self.score.insert_file(path, true);
        self
    }

    pub fn insert_once(mut self, path: impl AsRef<Path>) -> Self {
        self.score.insert_file_once(path, true);
        self
    }

    pub fn raw(mut self, line: impl Into<String>) -> Self {
        self.score.append(line);
        self
    }

    pub fn conditional(mut self, condition: &str, if_block: &str, else_block: Option<&str>) -> Self {
        self.score.add_conditional(condition, if_block, else_block);
        self
    }

    pub fn score(&self) -> &ScoreFile {
        &self.score
    }

    pub fn build(self) -> ScoreFile {
        self.score
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.score.save(path)
    }

    pub fn events(&self) -> Vec<ScoreEvent> {
        self.score.events()
    }
}

impl fmt::Display for ScoreBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.score, f)
    }
}
