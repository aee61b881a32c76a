//! Protocol constants shared by the client, the listener and the score tools.

/// Port the Antescofo object listens on for OSC.
pub const DEFAULT_ANTESCOFO_PORT: u16 = 5678;
/// Port Ascograph listens on.
pub const DEFAULT_ASCOGRAPH_PORT: u16 = 6789;
/// Port this client listens on for engine notifications.
pub const DEFAULT_RECEIVE_PORT: u16 = 9999;
/// Port the demo PureData synth patch listens on.
pub const DEFAULT_PD_LISTEN_PORT: u16 = 10000;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_LISTEN_HOST: &str = "127.0.0.1";

/// Prefix of every address Antescofo emits.
pub const OSC_PREFIX_ANTESCOFO: &str = "/antescofo/";

// Messages sent by Antescofo (suffixes after the prefix)
pub const MSG_STOP: &str = "stop";
pub const MSG_EVENT_BEATPOS: &str = "event_beatpos";
pub const MSG_RNOW: &str = "rnow";
pub const MSG_TEMPO: &str = "tempo";
pub const MSG_PITCH: &str = "pitch";
pub const MSG_ACTION_TRACE: &str = "action_trace";
pub const MSG_LOAD_SCORE: &str = "loadscore";
pub const MSG_CURRENT_SCORE_APPEND: &str = "current_score_append";

/// Kinds reported in the second argument of `action_trace`.
pub const ACTION_TRACE_TYPES: [&str; 9] = [
    "message",
    "abort",
    "assignment",
    "osc_recv",
    "conditional",
    "loop",
    "curve",
    "process",
    "function",
];

/// Internal commands understood by the Antescofo object.
pub mod commands {
    pub const ASCOGRAPHCOMM: &str = "ascographcomm";
    pub const INCOMINGOSC: &str = "incomingosc";
    /// Spelled exactly as the engine expects it.
    pub const INCOMING_OSC_PORT: &str = "IncmingOscPort";
    pub const ASCOGRAPHCONF: &str = "ascographconf";
    pub const LOAD: &str = "load";
    pub const START: &str = "start";
    pub const STOP: &str = "stop";
    pub const PAUSE: &str = "pause";
    pub const RESUME: &str = "resume";
    pub const TEMPO: &str = "tempo";
    pub const NEXTEVENT: &str = "nextevent";
    pub const PREVEVENT: &str = "prevevent";
}

/// Keywords that open a musical event line in a score.
pub const SCORE_EVENT_KEYWORDS: [&str; 6] = ["NOTE", "CHORD", "TRILL", "MULTI", "EVENT", "BPM"];
