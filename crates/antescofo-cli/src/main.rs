//! asco - Control Antescofo from the command line.
//!
//! Sends transport commands to a running Antescofo object, prints the
//! notifications it emits, manages the configuration file and works with
//! `.asco.txt` score files.

mod listen;
mod score;

use anyhow::{Context, Result};
use antescofo_core::{AntescofoClient, ClientOptions, Config, Value};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "asco")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Control the Antescofo score follower over OSC", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (default: ~/.config/antescofo/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Host running Antescofo
    #[arg(long, global = true)]
    host: Option<String>,

    /// Port Antescofo listens on
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Local port for Antescofo notifications
    #[arg(long, global = true)]
    receive_port: Option<u16>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Load a score file
    Load {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Start playback
    Start,
    /// Stop playback
    Stop,
    /// Pause playback
    Pause,
    /// Resume paused playback
    Resume,
    /// Skip to the next event
    Next,
    /// Go back to the previous event
    Prev,
    /// Set the tempo
    Tempo {
        #[arg(value_name = "BPM")]
        bpm: f64,
    },
    /// Send an OSC message under /antescofo/
    Send {
        #[arg(value_name = "ADDRESS")]
        address: String,
        /// Arguments, read as integers, floats or strings
        #[arg(value_name = "ARGS", allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Print notifications from Antescofo
    Listen {
        /// Stop after this many seconds
        #[arg(short, long)]
        seconds: Option<f64>,
    },
    /// Work with score files
    Score {
        #[command(subcommand)]
        action: ScoreAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Create a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Show the configuration file path
    Path,
    /// Print the effective configuration
    Show,
    /// Print one setting, e.g. `connection.send_port`
    Get { key: String },
    /// Change one setting and save the file
    Set { key: String, value: String },
}

#[derive(Subcommand, Debug)]
enum ScoreAction {
    /// Write the demo score
    Demo {
        #[arg(value_name = "OUT")]
        out: PathBuf,
    },
    /// Parse a score and report its structure
    Check {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Play a score locally, printing events and actions
    Play {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Tempo in BPM
        #[arg(short, long, default_value = "120")]
        tempo: f64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::config_path()?,
    };
    let config = match &cli.config {
        // a missing file is fine for `config init`
        Some(path) if !path.exists() => Config::default(),
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load_or_default(),
    };

    init_logger(&config.logging.level);
    let options = client_options(&cli.host, cli.port, cli.receive_port, &config);

    match cli.command {
        Commands::Config { action } => run_config(action, &config_path, config),
        Commands::Load { file } => {
            let path = config.resolve_score_path(&file);
            if !path.exists() {
                log::warn!("Score {} not found locally; sending the path anyway", path.display());
            }
            one_shot(options, |client| client.load_score(&path))?;
            println!("Loaded {}", path.display());
            Ok(())
        }
        Commands::Start => one_shot(options, AntescofoClient::start),
        Commands::Stop => one_shot(options, AntescofoClient::stop),
        Commands::Pause => one_shot(options, AntescofoClient::pause),
        Commands::Resume => one_shot(options, AntescofoClient::resume),
        Commands::Next => one_shot(options, AntescofoClient::next_event),
        Commands::Prev => one_shot(options, AntescofoClient::prev_event),
        Commands::Tempo { bpm } => one_shot(options, |client| client.set_tempo(bpm)),
        Commands::Send { address, args } => {
            let values: Vec<Value> = args.iter().map(|a| parse_arg(a)).collect();
            one_shot(options, |client| client.send_osc(&address, &values))
        }
        Commands::Listen { seconds } => listen::run(options, seconds, interrupt_flag()?),
        Commands::Score { action } => match action {
            ScoreAction::Demo { out } => score::demo(&out, &config),
            ScoreAction::Check { file } => score::check(&config.resolve_score_path(file)),
            ScoreAction::Play { file, tempo } => {
                score::play(&config.resolve_score_path(file), tempo, interrupt_flag()?)
            }
        },
    }
}

/// Connect without a listener, run one command and disconnect.
fn one_shot<F>(mut options: ClientOptions, command: F) -> Result<()>
where
    F: FnOnce(&AntescofoClient) -> antescofo_core::Result<()>,
{
    options.receive_port = None;
    let mut client = AntescofoClient::connect_with(options)?;
    command(&client)?;
    client.disconnect();
    Ok(())
}

/// `RUST_LOG` wins over the configured level.
fn init_logger(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

/// Flag raised by Ctrl+C.
fn interrupt_flag() -> Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, flag.clone())
        .context("Failed to install Ctrl+C handler")?;
    Ok(flag)
}

fn client_options(
    host: &Option<String>,
    port: Option<u16>,
    receive_port: Option<u16>,
    config: &Config,
) -> ClientOptions {
    let mut options = ClientOptions::from_config(config);
    if let Some(host) = host {
        options.host = host.clone();
    }
    if let Some(port) = port {
        options.port = port;
    }
    if receive_port.is_some() {
        options.receive_port = receive_port;
    }
    options
}

fn run_config(action: ConfigAction, path: &std::path::Path, mut config: Config) -> Result<()> {
    match action {
        ConfigAction::Init { force } => {
            let existed = path.exists();
            Config::init(path, force)?;
            if existed && !force {
                println!("Config already exists at: {} (use --force to overwrite)", path.display());
            } else {
                println!("Created default config at: {}", path.display());
            }
        }
        ConfigAction::Path => println!("{}", path.display()),
        ConfigAction::Show => print!("{}", config),
        ConfigAction::Get { key } => match config.get(&key)? {
            Some(toml::Value::String(s)) => println!("{}", s),
            Some(value) => println!("{}", value),
            None => println!("(unset)"),
        },
        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            config.save(path)?;
            println!("{} = {}", key, value);
        }
    }
    Ok(())
}

/// Read a command-line argument as an integer, then a float, then a string.
fn parse_arg(arg: &str) -> Value {
    if let Ok(i) = arg.parse::<i64>() {
        Value::Int(i)
    } else if let Ok(f) = arg.parse::<f64>() {
        Value::Float(f)
    } else {
        Value::from(arg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_arg() {
        assert_eq!(parse_arg("42"), Value::Int(42));
        assert_eq!(parse_arg("-3"), Value::Int(-3));
        assert_eq!(parse_arg("0.5"), Value::Float(0.5));
        assert_eq!(parse_arg("hello"), Value::from("hello"));
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["asco", "--port", "7000", "tempo", "96"]).unwrap();
        assert_eq!(cli.port, Some(7000));
        assert!(matches!(cli.command, Commands::Tempo { bpm } if bpm == 96.0));

        let cli = Cli::try_parse_from(["asco", "send", "volume", "-1", "x"]).unwrap();
        match cli.command {
            Commands::Send { address, args } => {
                assert_eq!(address, "volume");
                assert_eq!(args, vec!["-1", "x"]);
            }
            other => panic!("unexpected command {:?}", other),
        }

        let cli = Cli::try_parse_from(["asco", "config", "set", "connection.host", "box"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                action: ConfigAction::Set { .. }
            }
        ));
    }

    #[test]
    fn test_client_options_overrides() {
        let config = Config::default();
        let options = client_options(&Some("studio".to_string()), None, Some(9000), &config);
        assert_eq!(options.host, "studio");
        assert_eq!(options.port, 5678);
        assert_eq!(options.receive_port, Some(9000));
    }

    #[test]
    fn test_config_set_saves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        run_config(
            ConfigAction::Set {
                key: "connection.send_port".into(),
                value: "7100".into(),
            },
            &path,
            Config::default(),
        )
        .unwrap();
        assert_eq!(Config::load(&path).unwrap().connection.send_port, 7100);
    }
}
