//! Configuration file support.
//!
//! Configuration is stored in TOML format at:
//! - Linux: `~/.config/antescofo/config.toml`
//! - macOS: `~/Library/Application Support/antescofo/config.toml`
//! - Windows: `%APPDATA%\antescofo\config.toml`
//!
//! Every section falls back to its defaults for missing keys, so files
//! written by older versions keep working.

use crate::constants::{
    DEFAULT_ANTESCOFO_PORT, DEFAULT_ASCOGRAPH_PORT, DEFAULT_HOST, DEFAULT_LISTEN_HOST,
    DEFAULT_PD_LISTEN_PORT, DEFAULT_RECEIVE_PORT,
};
use crate::error::{Error, Result};
use crate::osc::CommandStyle;
use directories::{ProjectDirs, UserDirs};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Keys accepted by [`Config::get`] and [`Config::set`].
pub const KEYS: [&str; 13] = [
    "connection.host",
    "connection.send_port",
    "connection.receive",
    "connection.receive_port",
    "connection.listen_host",
    "connection.command_style",
    "ascograph.host",
    "ascograph.port",
    "paths.default_score_dir",
    "paths.pd_patch_path",
    "paths.antescofo_external_path",
    "synth.pd_listen_port",
    "logging.level",
];

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectionSettings,
    pub ascograph: AscographSettings,
    pub paths: PathSettings,
    pub synth: SynthSettings,
    pub logging: LoggingSettings,
}

/// Where Antescofo lives and how we listen for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Host running the Antescofo object
    pub host: String,
    /// Port Antescofo listens on
    pub send_port: u16,
    /// Whether to listen for engine notifications at all
    pub receive: bool,
    /// Local port for engine notifications
    pub receive_port: u16,
    /// Local interface the listener binds to
    pub listen_host: String,
    /// Wire form of internal commands
    pub command_style: CommandStyle,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            send_port: DEFAULT_ANTESCOFO_PORT,
            receive: true,
            receive_port: DEFAULT_RECEIVE_PORT,
            listen_host: DEFAULT_LISTEN_HOST.to_string(),
            command_style: CommandStyle::Raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AscographSettings {
    pub host: String,
    pub port: u16,
}

impl Default for AscographSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_ASCOGRAPH_PORT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    /// Directory searched for relative score names
    pub default_score_dir: PathBuf,
    /// PureData synth patch used by the demo score
    pub pd_patch_path: Option<PathBuf>,
    /// Directory holding the Antescofo external
    pub antescofo_external_path: Option<PathBuf>,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            default_score_dir: default_score_dir(),
            pd_patch_path: None,
            antescofo_external_path: None,
        }
    }
}

fn default_score_dir() -> PathBuf {
    let music = UserDirs::new().and_then(|dirs| {
        dirs.audio_dir()
            .map(Path::to_path_buf)
            .or_else(|| Some(dirs.home_dir().join("Music")))
    });
    music
        .unwrap_or_else(|| PathBuf::from("."))
        .join("antescofo_scores")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthSettings {
    /// Port the PureData synth listens on
    pub pd_listen_port: u16,
}

impl Default for SynthSettings {
    fn default() -> Self {
        Self {
            pd_listen_port: DEFAULT_PD_LISTEN_PORT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default log filter, overridden by RUST_LOG
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

const DEFAULT_CONFIG_FILE: &str = r#"# Antescofo client configuration

[connection]
# Host running the Antescofo object (Max/MSP, PureData or standalone)
host = "localhost"

# Port the Antescofo object listens on
send_port = 5678

# Listen for notifications (tempo, beat position, action traces, ...)
receive = true
receive_port = 9999

# Interface to bind the listener to
listen_host = "127.0.0.1"

# How internal commands are sent: "raw" (to "/" with the command name as
# first argument) or "address" (to "/antescofo/<command>")
command_style = "raw"

[ascograph]
host = "localhost"
port = 6789

[paths]
# Relative score names are looked up here after the current directory
# default_score_dir = "~/Music/antescofo_scores"
# pd_patch_path = "/path/to/pd_synth_patch.pd"
# antescofo_external_path = "/Applications/Pd.app/Contents/Resources/extra/"

[synth]
pd_listen_port = 10000

[logging]
# error, warn, info, debug or trace
level = "info"
"#;

impl Config {
    /// Default configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = ProjectDirs::from("", "", "antescofo") {
            Ok(proj_dirs.config_dir().join("config.toml"))
        } else {
            Err(Error::Config("Could not determine config directory".to_string()))
        }
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Config file not found at {}",
                path.display()
            )));
        }
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the default location, falling back to defaults
    pub fn load_or_default() -> Self {
        match Self::config_path().and_then(|p| Self::load(&p)) {
            Ok(config) => config,
            Err(e) => {
                log::debug!("Using default configuration: {}", e);
                Self::default()
            }
        }
    }

    /// Save to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        log::info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Write the commented default file to `path`.
    ///
    /// An existing file is left alone unless `force` is set.
    pub fn init(path: &Path, force: bool) -> Result<PathBuf> {
        if path.exists() && !force {
            log::info!("Config already exists at {}", path.display());
            return Ok(path.to_path_buf());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, DEFAULT_CONFIG_FILE)?;
        log::info!("Created config file at {}", path.display());
        Ok(path.to_path_buf())
    }

    /// Look up a dotted key such as `connection.send_port`.
    ///
    /// Returns `Ok(None)` for optional settings that are unset.
    pub fn get(&self, key: &str) -> Result<Option<toml::Value>> {
        check_key(key)?;
        let tree = toml::Value::try_from(self)?;
        let (section, field) = split_key(key)?;
        Ok(tree.get(section).and_then(|s| s.get(field)).cloned())
    }

    /// Set a dotted key from its textual form.
    ///
    /// The text is converted to the type the setting already has, and the
    /// result is validated against the schema before it is applied.
    pub fn set(&mut self, key: &str, raw: &str) -> Result<()> {
        check_key(key)?;
        let mut tree = toml::Value::try_from(&*self)?;
        let (section, field) = split_key(key)?;
        let table = tree
            .get_mut(section)
            .and_then(toml::Value::as_table_mut)
            .ok_or_else(|| Error::Config(format!("Unknown configuration section: {}", section)))?;

        let value = convert_like(table.get(field), raw)
            .ok_or_else(|| Error::Config(format!("Invalid value '{}' for {}", raw, key)))?;
        table.insert(field.to_string(), value);

        let updated = tree
            .try_into::<Config>()
            .map_err(|e| Error::Config(format!("Invalid value '{}' for {}: {}", raw, key, e)))?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Check values the schema alone cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.logging.level.parse::<log::LevelFilter>().is_err() {
            return Err(Error::Config(format!(
                "Invalid logging.level '{}': expected off, error, warn, info, debug or trace",
                self.logging.level
            )));
        }
        Ok(())
    }

    /// Port to listen on, or `None` when receiving is disabled
    pub fn receive_port(&self) -> Option<u16> {
        self.connection
            .receive
            .then_some(self.connection.receive_port)
    }

    /// Resolve a score file name.
    ///
    /// Absolute paths are returned unchanged. Relative names are tried in
    /// the current directory, then in `default_score_dir`; if neither
    /// exists the name is resolved against the current directory.
    pub fn resolve_score_path(&self, name: impl AsRef<Path>) -> PathBuf {
        let name = name.as_ref();
        if name.is_absolute() {
            return name.to_path_buf();
        }
        if name.exists() {
            return absolutize(name);
        }
        let in_default = self.paths.default_score_dir.join(name);
        if in_default.exists() {
            return in_default;
        }
        absolutize(name)
    }
}

fn absolutize(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    })
}

fn check_key(key: &str) -> Result<()> {
    if KEYS.contains(&key) {
        Ok(())
    } else {
        Err(Error::Config(format!("Unknown configuration key: {}", key)))
    }
}

fn split_key(key: &str) -> Result<(&str, &str)> {
    key.split_once('.')
        .ok_or_else(|| Error::Config(format!("Expected section.key, got {}", key)))
}

fn convert_like(existing: Option<&toml::Value>, raw: &str) -> Option<toml::Value> {
    match existing {
        Some(toml::Value::Integer(_)) => raw.trim().parse().ok().map(toml::Value::Integer),
        Some(toml::Value::Float(_)) => raw.trim().parse().ok().map(toml::Value::Float),
        Some(toml::Value::Boolean(_)) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(toml::Value::Boolean(true)),
            "false" | "no" | "off" | "0" => Some(toml::Value::Boolean(false)),
            _ => None,
        },
        // strings, and optional paths that are currently unset
        _ => Some(toml::Value::String(raw.to_string())),
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match toml::to_string_pretty(self) {
            Ok(s) => f.write_str(&s),
            Err(_) => Err(fmt::Error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.connection.send_port, 5678);
        assert_eq!(config.receive_port(), Some(9999));
        assert_eq!(config.ascograph.port, 6789);
        assert_eq!(config.connection.command_style, CommandStyle::Raw);
        assert!(config
            .paths
            .default_score_dir
            .ends_with("antescofo_scores"));
    }

    #[test]
    fn test_default_file_parses_to_defaults() {
        let parsed: Config = toml::from_str(DEFAULT_CONFIG_FILE).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_partial_file_merges_with_defaults() {
        let parsed: Config = toml::from_str("[connection]\nsend_port = 7000\n").unwrap();
        assert_eq!(parsed.connection.send_port, 7000);
        assert_eq!(parsed.connection.host, "localhost");
        assert_eq!(parsed.logging.level, "info");
    }

    #[test]
    fn test_save_load_and_init() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        assert!(matches!(Config::load(&path), Err(Error::Config(_))));

        Config::init(&path, false).unwrap();
        assert_eq!(Config::load(&path).unwrap(), Config::default());

        let mut config = Config::default();
        config.connection.host = "10.0.0.2".to_string();
        config.save(&path).unwrap();

        // init without force keeps the user's file
        Config::init(&path, false).unwrap();
        assert_eq!(Config::load(&path).unwrap().connection.host, "10.0.0.2");

        Config::init(&path, true).unwrap();
        assert_eq!(Config::load(&path).unwrap().connection.host, "localhost");
    }

    #[test]
    fn test_get_and_set() {
        let mut config = Config::default();
        assert_eq!(
            config.get("connection.send_port").unwrap(),
            Some(toml::Value::Integer(5678))
        );
        assert_eq!(config.get("paths.pd_patch_path").unwrap(), None);
        assert!(config.get("nope.key").is_err());

        config.set("connection.send_port", "7001").unwrap();
        assert_eq!(config.connection.send_port, 7001);

        config.set("connection.receive", "off").unwrap();
        assert_eq!(config.receive_port(), None);

        config.set("connection.command_style", "address").unwrap();
        assert_eq!(config.connection.command_style, CommandStyle::Address);

        config.set("paths.pd_patch_path", "/tmp/synth.pd").unwrap();
        assert_eq!(
            config.paths.pd_patch_path,
            Some(PathBuf::from("/tmp/synth.pd"))
        );
    }

    #[test]
    fn test_set_rejects_bad_values() {
        let mut config = Config::default();
        assert!(config.set("connection.send_port", "not-a-port").is_err());
        assert!(config.set("connection.send_port", "70000").is_err());
        assert!(config.set("connection.command_style", "carrier-pigeon").is_err());
        assert!(config.set("logging.level", "verbose").is_err());
        assert_eq!(config, Config::default());

        config.set("logging.level", "debug").unwrap();
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_load_rejects_unknown_log_level() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[logging]\nlevel = \"loud\"\n").unwrap();
        assert!(matches!(Config::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_resolve_score_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.paths.default_score_dir = dir.path().to_path_buf();

        let abs = dir.path().join("x.asco.txt");
        assert_eq!(config.resolve_score_path(&abs), abs);

        let stored = dir.path().join("stored_only_here.asco.txt");
        fs::write(&stored, "NOTE 60 1.0\n").unwrap();
        assert_eq!(
            config.resolve_score_path("stored_only_here.asco.txt"),
            stored
        );

        // the current directory wins over default_score_dir
        fs::write(dir.path().join("Cargo.toml"), "").unwrap();
        assert_eq!(
            config.resolve_score_path("Cargo.toml"),
            fs::canonicalize("Cargo.toml").unwrap()
        );

        let missing = config.resolve_score_path("definitely_missing.asco.txt");
        assert!(missing.is_absolute());
        assert!(missing.ends_with("definitely_missing.asco.txt"));
    }
}
