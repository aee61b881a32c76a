//! OSC (Open Sound Control) transport for Antescofo communication.
//!
//! Outbound traffic goes through [`OscClient`], a UDP socket bound to an
//! ephemeral port. Inbound traffic is handled by [`OscListener`], which
//! owns one background thread that decodes packets into events and hands
//! them to an [`EventDispatcher`]. [`OscChannel`] ties both together into
//! the bidirectional channel used by the high-level client.

use crate::constants::{DEFAULT_LISTEN_HOST, OSC_PREFIX_ANTESCOFO};
use crate::error::{Error, Result};
use crate::events::{Event, EventDispatcher, EventKind, HandlerId};
use crate::value::{to_osc_args, Value};
use rosc::{encoder, OscMessage, OscPacket, OscType};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How often the listener thread wakes up to check for shutdown.
const LISTEN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Largest UDP payload.
const RECV_BUFFER_SIZE: usize = 65536;

/// How internal engine commands are put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStyle {
    /// Message to `/` whose first argument is the command name.
    #[default]
    Raw,
    /// Message to `/antescofo/<command>` carrying only the arguments.
    Address,
}

impl CommandStyle {
    /// Build the message for `command` with already-encoded arguments.
    pub fn build(self, command: &str, args: Vec<OscType>) -> OscMessage {
        match self {
            CommandStyle::Raw => {
                let mut all = Vec::with_capacity(args.len() + 1);
                all.push(OscType::String(command.to_string()));
                all.extend(args);
                OscMessage {
                    addr: "/".to_string(),
                    args: all,
                }
            }
            CommandStyle::Address => OscMessage {
                addr: format!("{}{}", OSC_PREFIX_ANTESCOFO, command),
                args,
            },
        }
    }
}

/// UDP-based OSC client for sending messages to Antescofo.
#[derive(Clone)]
pub struct OscClient {
    sock: Arc<UdpSocket>,
    target: SocketAddr,
}

impl OscClient {
    /// Create a new OSC client targeting the given address.
    ///
    /// # Arguments
    /// * `addr` - Anything resolvable to a socket address, e.g. `"localhost:5678"`,
    ///   `"[::1]:5678"` or `("::1", 5678)`
    ///
    /// The send socket is bound in the same address family as the target.
    pub fn new<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let candidates: Vec<SocketAddr> = addr
            .to_socket_addrs()
            .map_err(|e| Error::Osc(format!("Failed to resolve target address: {}", e)))?
            .collect();
        let target = pick_target(&candidates)
            .ok_or_else(|| Error::Osc("Target address did not resolve".to_string()))?;

        let local: SocketAddr = if target.is_ipv6() {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        };
        let sock = UdpSocket::bind(local)
            .map_err(|e| Error::Osc(format!("Failed to bind send socket: {}", e)))?;
        Ok(Self {
            sock: Arc::new(sock),
            target,
        })
    }

    /// Resolved address packets are sent to.
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Send an OSC message with the given path and arguments.
    pub fn send_msg(&self, path: &str, args: Vec<OscType>) -> Result<()> {
        self.send_packet(&Self::msg(path, args))
    }

    /// Encode and send a packet.
    pub fn send_packet(&self, packet: &OscPacket) -> Result<()> {
        let buf = encoder::encode(packet)?;
        self.sock
            .send_to(&buf, self.target)
            .map_err(|e| Error::Osc(format!("Failed to send OSC message to {}: {}", self.target, e)))?;
        Ok(())
    }

    /// Create an OSC message packet.
    pub fn msg(path: &str, args: Vec<OscType>) -> OscPacket {
        OscPacket::Message(OscMessage {
            addr: path.into(),
            args,
        })
    }
}

impl std::fmt::Debug for OscClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OscClient")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// Prefer IPv4 when a name resolves to both families.
fn pick_target(candidates: &[SocketAddr]) -> Option<SocketAddr> {
    candidates
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| candidates.first())
        .copied()
}

/// `"[::1]"` and `"::1"` name the same host.
fn strip_brackets(host: &str) -> &str {
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
}

/// Background receiver that dispatches every decoded packet as events.
pub struct OscListener {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl OscListener {
    /// Bind `host:port` and start the receive thread.
    ///
    /// Port 0 picks a free port; see [`OscListener::local_addr`].
    pub fn start(host: &str, port: u16, dispatcher: EventDispatcher) -> Result<Self> {
        let sock = UdpSocket::bind((host, port))
            .map_err(|e| Error::Osc(format!("Failed to bind {}:{}: {}", host, port, e)))?;
        sock.set_read_timeout(Some(LISTEN_POLL_INTERVAL))?;
        let local_addr = sock.local_addr()?;

        let running = Arc::new(AtomicBool::new(true));
        let thread_running = running.clone();
        let thread = thread::Builder::new()
            .name("antescofo-osc-listener".to_string())
            .spawn(move || listen_loop(sock, dispatcher, thread_running))?;

        log::info!("Started OSC listener on {}", local_addr);
        Ok(Self {
            local_addr,
            running,
            thread: Some(thread),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Stop the receive thread and wait for it to exit.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
            log::info!("Stopped OSC listener on {}", self.local_addr);
        }
    }
}

impl std::fmt::Debug for OscListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OscListener")
            .field("local_addr", &self.local_addr)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl Drop for OscListener {
    fn drop(&mut self) {
        self.stop();
    }
}

fn listen_loop(sock: UdpSocket, dispatcher: EventDispatcher, running: Arc<AtomicBool>) {
    let mut buf = [0u8; RECV_BUFFER_SIZE];
    while running.load(Ordering::Relaxed) {
        let size = match sock.recv_from(&mut buf) {
            Ok((size, from)) => {
                log::trace!("Received {} bytes from {}", size, from);
                size
            }
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(e) => {
                log::warn!("OSC receive error: {}", e);
                continue;
            }
        };

        match rosc::decoder::decode_udp(&buf[..size]) {
            Ok((_, packet)) => {
                for event in Event::from_osc_packet(&packet) {
                    log::debug!(
                        "Received Antescofo message: {}",
                        event.raw_address.as_deref().unwrap_or("?")
                    );
                    dispatcher.dispatch(&event);
                }
            }
            Err(e) => log::warn!("Dropping malformed OSC packet ({} bytes): {}", size, e),
        }
    }
}

/// Bidirectional OSC channel to one Antescofo instance.
#[derive(Debug)]
pub struct OscChannel {
    client: OscClient,
    listener: Option<OscListener>,
    dispatcher: EventDispatcher,
    host: String,
    send_port: u16,
    receive_port: Option<u16>,
    listen_host: String,
}

impl OscChannel {
    /// Create a channel sending to `host:send_port`.
    ///
    /// Receiving stays off until [`OscChannel::start_receiving`] is called,
    /// and is only possible when `receive_port` is set.
    pub fn new(host: &str, send_port: u16, receive_port: Option<u16>) -> Result<Self> {
        let client = OscClient::new((strip_brackets(host), send_port))?;
        log::info!(
            "OSC channel initialized: send to {}, receive on port {:?}",
            client.target(),
            receive_port
        );
        Ok(Self {
            client,
            listener: None,
            dispatcher: EventDispatcher::new(),
            host: host.to_string(),
            send_port,
            receive_port,
            listen_host: DEFAULT_LISTEN_HOST.to_string(),
        })
    }

    /// Route events through an existing dispatcher, keeping its handlers.
    pub fn with_dispatcher(mut self, dispatcher: EventDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Interface the listener binds to (defaults to loopback).
    pub fn with_listen_host(mut self, host: impl Into<String>) -> Self {
        self.listen_host = host.into();
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn send_port(&self) -> u16 {
        self.send_port
    }

    pub fn receive_port(&self) -> Option<u16> {
        self.receive_port
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    pub fn is_receiving(&self) -> bool {
        self.listener.is_some()
    }

    /// Address the listener is actually bound to, if receiving.
    pub fn listen_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().map(OscListener::local_addr)
    }

    pub fn start_receiving(&mut self) -> Result<()> {
        let port = self
            .receive_port
            .ok_or_else(|| Error::Osc("Cannot start receiving: no receive port specified".to_string()))?;

        if self.listener.is_some() {
            log::warn!("OSC listener already running");
            return Ok(());
        }

        let listener = OscListener::start(&self.listen_host, port, self.dispatcher.clone())
            .map_err(|e| Error::Osc(format!("Failed to start OSC listener: {}", e)))?;
        self.listener = Some(listener);
        Ok(())
    }

    pub fn stop_receiving(&mut self) {
        if let Some(mut listener) = self.listener.take() {
            listener.stop();
        }
    }

    /// Send `args` to `address`, spreading each value into OSC arguments.
    pub fn send(&self, address: &str, args: &[Value]) -> Result<()> {
        let osc_args: Vec<OscType> = args.iter().flat_map(to_osc_args).collect();
        log::debug!("Sent OSC message: {} {:?}", address, osc_args);
        self.client.send_msg(address, osc_args)
    }

    /// Send an internal engine command.
    pub fn send_command(&self, command: &str, args: &[Value], style: CommandStyle) -> Result<()> {
        let osc_args: Vec<OscType> = args.iter().flat_map(to_osc_args).collect();
        let msg = style.build(command, osc_args);
        log::debug!("Sent command: {} {:?}", msg.addr, msg.args);
        self.client.send_packet(&OscPacket::Message(msg))
    }

    pub fn subscribe<F>(&self, kind: Option<EventKind>, handler: F) -> HandlerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.dispatcher.subscribe(kind, handler)
    }

    pub fn unsubscribe(&self, id: HandlerId) -> bool {
        self.dispatcher.unsubscribe(id)
    }

    /// Stop receiving and drop every handler.
    pub fn close(&mut self) {
        self.stop_receiving();
        self.dispatcher.clear();
        log::info!("OSC channel closed");
    }
}

impl Drop for OscChannel {
    fn drop(&mut self) {
        self.stop_receiving();
    }
}
