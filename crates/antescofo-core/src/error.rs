//! Error types for antescofo-core

use std::io;
use thiserror::Error;

/// Result type alias for antescofo-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to Antescofo or handling scores
#[derive(Debug, Error)]
pub enum Error {
    /// Connecting to the engine failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// An operation needed a connection but the client is disconnected
    #[error("Not connected to Antescofo. Call connect() first.")]
    NotConnected,

    /// Sending or receiving over UDP failed
    #[error("OSC error: {0}")]
    Osc(String),

    /// A packet could not be encoded or decoded
    #[error("OSC codec error: {0}")]
    OscCodec(#[from] rosc::OscError),

    /// Reading, writing or building a score failed
    #[error("Score error: {0}")]
    Score(String),

    /// Nothing arrived before the deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// An inbound message had an unexpected shape
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// A caller-supplied value was rejected
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}
