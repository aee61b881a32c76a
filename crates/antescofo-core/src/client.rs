//! High-level client for controlling an Antescofo instance.
//!
//! ```no_run
//! use antescofo_core::{AntescofoClient, ClientOptions, EventKind};
//!
//! # fn main() -> antescofo_core::Result<()> {
//! let mut client = AntescofoClient::connect_with(ClientOptions::default())?;
//! client.on(EventKind::Tempo, |event| println!("tempo: {}", event))?;
//! client.load_score("myscore.asco.txt")?;
//! client.start()?;
//! client.set_tempo(120.0)?;
//! client.stop()?;
//! client.disconnect();
//! # Ok(())
//! # }
//! ```

use crate::config::Config;
use crate::constants::{
    commands, DEFAULT_ANTESCOFO_PORT, DEFAULT_ASCOGRAPH_PORT, DEFAULT_HOST, DEFAULT_LISTEN_HOST,
    DEFAULT_RECEIVE_PORT, OSC_PREFIX_ANTESCOFO,
};
use crate::error::{Error, Result};
use crate::events::{Event, EventDispatcher, EventKind, HandlerId};
use crate::osc::{CommandStyle, OscChannel};
use crate::value::Value;
use std::net::SocketAddr;
use std::path::Path;
use std::thread;
use std::time::Duration;

/// Connection settings for [`AntescofoClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    /// Host running Antescofo
    pub host: String,
    /// Port Antescofo listens on
    pub port: u16,
    /// Local port for notifications; `None` disables receiving
    pub receive_port: Option<u16>,
    pub listen_host: String,
    pub command_style: CommandStyle,
    pub ascograph_host: String,
    pub ascograph_port: u16,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_ANTESCOFO_PORT,
            receive_port: Some(DEFAULT_RECEIVE_PORT),
            listen_host: DEFAULT_LISTEN_HOST.to_string(),
            command_style: CommandStyle::default(),
            ascograph_host: DEFAULT_HOST.to_string(),
            ascograph_port: DEFAULT_ASCOGRAPH_PORT,
        }
    }
}

impl ClientOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            host: config.connection.host.clone(),
            port: config.connection.send_port,
            receive_port: config.receive_port(),
            listen_host: config.connection.listen_host.clone(),
            command_style: config.connection.command_style,
            ascograph_host: config.ascograph.host.clone(),
            ascograph_port: config.ascograph.port,
        }
    }
}

/// Controls one Antescofo instance over OSC.
///
/// The connection is closed when the client is dropped.
#[derive(Debug)]
pub struct AntescofoClient {
    options: ClientOptions,
    channel: Option<OscChannel>,
    dispatcher: EventDispatcher,
}

impl AntescofoClient {
    pub fn new(options: ClientOptions) -> Self {
        Self {
            options,
            channel: None,
            dispatcher: EventDispatcher::new(),
        }
    }

    /// Create a client and connect right away.
    pub fn connect_with(options: ClientOptions) -> Result<Self> {
        let mut client = Self::new(options);
        client.connect()?;
        Ok(client)
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Dispatcher every connection of this client delivers events to.
    ///
    /// Subscribing here before [`connect`](Self::connect) catches the
    /// notifications Antescofo sends as soon as reporting is enabled.
    /// Handlers are cleared on disconnect.
    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    /// Address the notification listener is bound to, if any.
    pub fn listen_addr(&self) -> Option<SocketAddr> {
        self.channel.as_ref().and_then(OscChannel::listen_addr)
    }

    /// Open the OSC channel.
    ///
    /// With a receive port configured this also starts the listener and
    /// asks Antescofo to report back to us.
    pub fn connect(&mut self) -> Result<()> {
        if self.channel.is_some() {
            log::warn!("Already connected to Antescofo");
            return Ok(());
        }

        let host = self.options.host.clone();
        let port = self.options.port;
        // A failed attempt drops the channel, which stops any listener it started.
        let channel = self.open_channel().map_err(|e| {
            Error::Connection(format!(
                "Failed to connect to Antescofo at {host}:{port}: {e}\n\n\
                 Make sure Antescofo is running and listening on {host}:{port}.\n\
                 Antescofo (Max/MSP external, PureData external, or standalone) must be \
                 running before this client can control it.\n\n\
                 To check if Antescofo is running:\n  \
                 - Max/MSP: check that the antescofo~ object is loaded\n  \
                 - PureData: check that the antescofo external is loaded\n  \
                 - Standalone: launch the Antescofo application\n\n\
                 More information: https://antescofo-doc.ircam.fr/"
            ))
        })?;

        self.channel = Some(channel);
        log::info!("Connected to Antescofo at {}:{}", host, port);
        Ok(())
    }

    fn open_channel(&self) -> Result<OscChannel> {
        let mut channel = OscChannel::new(
            &self.options.host,
            self.options.port,
            self.options.receive_port,
        )?
        .with_dispatcher(self.dispatcher.clone())
        .with_listen_host(self.options.listen_host.clone());

        if channel.receive_port().is_some() {
            channel.start_receiving()?;
            channel.send_command(
                commands::ASCOGRAPHCOMM,
                &[Value::from(1)],
                self.options.command_style,
            )?;
        }
        Ok(channel)
    }

    /// Close the channel. Does nothing when already disconnected.
    pub fn disconnect(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close();
            log::info!("Disconnected from Antescofo");
        }
    }

    fn channel(&self) -> Result<&OscChannel> {
        self.channel.as_ref().ok_or(Error::NotConnected)
    }

    fn send_command(&self, command: &str, args: &[Value]) -> Result<()> {
        self.channel()?
            .send_command(command, args, self.options.command_style)
    }

    /// Send a message under `/antescofo/`.
    ///
    /// `"tempo"`, `"/tempo"` and `"/antescofo/tempo"` all address the same
    /// message.
    pub fn send_osc(&self, address: &str, args: &[Value]) -> Result<()> {
        let channel = self.channel()?;
        let address = if address.starts_with(OSC_PREFIX_ANTESCOFO) {
            address.to_string()
        } else {
            format!("{}{}", OSC_PREFIX_ANTESCOFO, address.trim_start_matches('/'))
        };
        channel.send(&address, args)
    }

    // Transport

    /// Ask Antescofo to load a score file.
    pub fn load_score(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref().to_string_lossy().into_owned();
        log::info!("Loading score: {}", path);
        self.send_command(commands::LOAD, &[Value::from(path)])
    }

    pub fn start(&self) -> Result<()> {
        log::info!("Starting playback");
        self.send_command(commands::START, &[])
    }

    pub fn stop(&self) -> Result<()> {
        log::info!("Stopping playback");
        self.send_command(commands::STOP, &[])
    }

    pub fn pause(&self) -> Result<()> {
        log::info!("Pausing playback");
        self.send_command(commands::PAUSE, &[])
    }

    pub fn resume(&self) -> Result<()> {
        log::info!("Resuming playback");
        self.send_command(commands::RESUME, &[])
    }

    pub fn next_event(&self) -> Result<()> {
        log::debug!("Skipping to next event");
        self.send_command(commands::NEXTEVENT, &[])
    }

    pub fn prev_event(&self) -> Result<()> {
        log::debug!("Going to previous event");
        self.send_command(commands::PREVEVENT, &[])
    }

    /// Set the tempo in BPM.
    pub fn set_tempo(&self, bpm: f64) -> Result<()> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(Error::InvalidArgument(format!(
                "Tempo must be a positive number of BPM, got {}",
                bpm
            )));
        }
        log::info!("Setting tempo to {}", bpm);
        self.send_command(commands::TEMPO, &[Value::Float(bpm)])
    }

    // Engine OSC configuration

    /// Turn Antescofo's outgoing notifications on or off.
    pub fn enable_osc_communication(&self, enable: bool) -> Result<()> {
        self.send_command(commands::ASCOGRAPHCOMM, &[Value::from(i32::from(enable))])
    }

    pub fn enable_incoming_osc(&self, enable: bool) -> Result<()> {
        self.send_command(commands::INCOMINGOSC, &[Value::from(i32::from(enable))])
    }

    pub fn set_incoming_osc_port(&self, port: u16) -> Result<()> {
        self.send_command(commands::INCOMING_OSC_PORT, &[Value::from(port)])
    }

    /// Point Antescofo at an Ascograph instance.
    pub fn configure_ascograph(&self, host: &str, port: u16) -> Result<()> {
        self.send_command(commands::ASCOGRAPHCONF, &[Value::from(host), Value::from(port)])
    }

    /// [`configure_ascograph`](Self::configure_ascograph) with the configured host and port.
    pub fn configure_default_ascograph(&self) -> Result<()> {
        self.configure_ascograph(&self.options.ascograph_host, self.options.ascograph_port)
    }

    // Events

    /// Call `handler` for every event of `kind`.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> Result<HandlerId>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        Ok(self.channel()?.subscribe(Some(kind), handler))
    }

    /// Call `handler` for every event.
    pub fn on_any<F>(&self, handler: F) -> Result<HandlerId>
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        Ok(self.channel()?.subscribe(None, handler))
    }

    /// Remove a handler. Returns false if it was not registered.
    pub fn off(&self, id: HandlerId) -> Result<bool> {
        Ok(self.channel()?.unsubscribe(id))
    }

    /// Block until an event of `kind` arrives.
    pub fn wait_for(&self, kind: EventKind, timeout: Duration) -> Result<Event> {
        let channel = self.channel()?;
        let (tx, rx) = crossbeam_channel::bounded(1);
        let id = channel.subscribe(Some(kind), move |event| {
            let _ = tx.try_send(event.clone());
        });
        let received = rx.recv_timeout(timeout);
        channel.unsubscribe(id);
        received.map_err(|_| Error::Timeout(format!("No {} event within {:?}", kind, timeout)))
    }

    /// Sleep, keeping the listener alive while Antescofo plays.
    pub fn wait(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

impl Drop for AntescofoClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}
