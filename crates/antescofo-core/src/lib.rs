//! Antescofo Core - OSC control and score tools for the Antescofo score follower.
//!
//! This crate talks to an Antescofo object running in Max/MSP, PureData or
//! the standalone application:
//!
//! - **Client** - Connect, load scores, drive the transport, set the tempo
//! - **OSC** - UDP sender, background listener and the channel joining them
//! - **Events** - Typed notifications (tempo, beat position, action traces)
//!   and the dispatcher that routes them to handlers
//! - **Values** - Antescofo scalars, tabs and maps and their OSC encoding
//! - **Score** - Generate and read the line-oriented `.asco.txt` format
//! - **Player** - Walk a score's events in real time without an engine
//! - **Config** - The user's TOML configuration file
//!
//! # Architecture
//!
//! Commands flow out through [`AntescofoClient`], which owns an
//! [`OscChannel`]. Notifications arrive on the channel's listener thread,
//! are decoded into [`Event`]s and delivered by the shared
//! [`EventDispatcher`] to every subscribed handler.

pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod osc;
pub mod player;
pub mod score;
pub mod value;

pub use client::{AntescofoClient, ClientOptions};
pub use config::Config;
pub use error::{Error, Result};
pub use events::{
    ActionTrace, Event, EventData, EventDispatcher, EventHandler, EventKind, HandlerId, TraceType,
};
pub use osc::{CommandStyle, OscChannel, OscClient, OscListener};
pub use player::{LogSink, PlaybackReport, PlaybackSink, ScorePlayer};
pub use score::{EventLine, ScoreBuilder, ScoreEvent, ScoreFile, ScoreLine};
pub use value::{Map, Tab, Value};
