//! Events reported by Antescofo and the dispatcher that routes them.
//!
//! Antescofo notifies its listeners with OSC messages under the
//! `/antescofo/` prefix (`/antescofo/tempo 92.5`,
//! `/antescofo/event_beatpos 12`, ...). This module turns those messages
//! into typed [`Event`]s and fans them out to handlers registered on an
//! [`EventDispatcher`].

use crate::constants::{
    ACTION_TRACE_TYPES, MSG_ACTION_TRACE, MSG_CURRENT_SCORE_APPEND, MSG_EVENT_BEATPOS,
    MSG_LOAD_SCORE, MSG_PITCH, MSG_RNOW, MSG_STOP, MSG_TEMPO, OSC_PREFIX_ANTESCOFO,
};
use crate::error::{Error, Result};
use crate::value::Value;
use rosc::{OscMessage, OscPacket, OscType};
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Kinds of events Antescofo can send.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Stop,
    BeatPosition,
    Rnow,
    Tempo,
    Pitch,
    ActionTrace,
    LoadScore,
    CurrentScoreAppend,
    /// Anything we do not recognise.
    Unknown,
}

impl EventKind {
    /// All kinds that correspond to a known message.
    pub const KNOWN: [EventKind; 8] = [
        EventKind::Stop,
        EventKind::BeatPosition,
        EventKind::Rnow,
        EventKind::Tempo,
        EventKind::Pitch,
        EventKind::ActionTrace,
        EventKind::LoadScore,
        EventKind::CurrentScoreAppend,
    ];

    /// Map a message name (the part after `/antescofo/`) to a kind.
    pub fn from_message(message: &str) -> Self {
        Self::KNOWN
            .iter()
            .copied()
            .find(|kind| kind.as_str() == message)
            .unwrap_or(EventKind::Unknown)
    }

    /// The message name for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Stop => MSG_STOP,
            EventKind::BeatPosition => MSG_EVENT_BEATPOS,
            EventKind::Rnow => MSG_RNOW,
            EventKind::Tempo => MSG_TEMPO,
            EventKind::Pitch => MSG_PITCH,
            EventKind::ActionTrace => MSG_ACTION_TRACE,
            EventKind::LoadScore => MSG_LOAD_SCORE,
            EventKind::CurrentScoreAppend => MSG_CURRENT_SCORE_APPEND,
            EventKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::from_message(s))
    }
}

/// What kind of action produced an action trace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TraceType {
    Message,
    Abort,
    Assignment,
    OscRecv,
    Conditional,
    Loop,
    Curve,
    Process,
    Function,
    Other(String),
}

impl TraceType {
    pub fn parse(s: &str) -> Self {
        match s {
            "message" => TraceType::Message,
            "abort" => TraceType::Abort,
            "assignment" => TraceType::Assignment,
            "osc_recv" => TraceType::OscRecv,
            "conditional" => TraceType::Conditional,
            "loop" => TraceType::Loop,
            "curve" => TraceType::Curve,
            "process" => TraceType::Process,
            "function" => TraceType::Function,
            other => TraceType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TraceType::Message => ACTION_TRACE_TYPES[0],
            TraceType::Abort => ACTION_TRACE_TYPES[1],
            TraceType::Assignment => ACTION_TRACE_TYPES[2],
            TraceType::OscRecv => ACTION_TRACE_TYPES[3],
            TraceType::Conditional => ACTION_TRACE_TYPES[4],
            TraceType::Loop => ACTION_TRACE_TYPES[5],
            TraceType::Curve => ACTION_TRACE_TYPES[6],
            TraceType::Process => ACTION_TRACE_TYPES[7],
            TraceType::Function => ACTION_TRACE_TYPES[8],
            TraceType::Other(s) => s,
        }
    }
}

impl fmt::Display for TraceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One traced action execution.
///
/// Wire layout: `action_name trace_type father_name now rnow message`.
#[derive(Clone, Debug, PartialEq)]
pub struct ActionTrace {
    pub action_name: String,
    pub trace_type: TraceType,
    /// Name of the enclosing action (group, loop, ...).
    pub father_name: String,
    /// Absolute time.
    pub now: f64,
    /// Relative (musical) time.
    pub rnow: f64,
    pub message: String,
}

impl ActionTrace {
    /// Decode the arguments of an `action_trace` message.
    pub fn from_args(args: &[OscType]) -> Result<Self> {
        if args.len() < 6 {
            return Err(Error::InvalidMessage(format!(
                "action_trace needs 6 arguments, got {}",
                args.len()
            )));
        }
        let time = |arg: &OscType, name: &str| {
            osc_to_f64(arg).ok_or_else(|| {
                Error::InvalidMessage(format!("action_trace {} is not a number: {:?}", name, arg))
            })
        };
        Ok(Self {
            action_name: osc_to_text(&args[0]),
            trace_type: TraceType::parse(&osc_to_text(&args[1])),
            father_name: osc_to_text(&args[2]),
            now: time(&args[3], "now")?,
            rnow: time(&args[4], "rnow")?,
            message: osc_to_text(&args[5]),
        })
    }
}

fn osc_to_text(arg: &OscType) -> String {
    match arg {
        OscType::String(s) => s.clone(),
        other => Value::from_osc(other).to_string(),
    }
}

fn osc_to_f64(arg: &OscType) -> Option<f64> {
    match arg {
        OscType::String(s) => s.trim().parse().ok(),
        other => Value::from_osc(other).as_f64(),
    }
}

/// Payload of an event.
#[derive(Clone, Debug, PartialEq)]
pub enum EventData {
    Empty,
    Single(Value),
    List(Vec<Value>),
    ActionTrace(ActionTrace),
}

/// An event received from Antescofo.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub data: EventData,
    /// The OSC address the event arrived on.
    pub raw_address: Option<String>,
}

impl Event {
    pub fn new(kind: EventKind, data: EventData) -> Self {
        Self {
            kind,
            data,
            raw_address: None,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.raw_address = Some(address.into());
        self
    }

    /// Decode an OSC message into an event.
    pub fn from_osc_message(msg: &OscMessage) -> Self {
        let Some(message_type) = msg.addr.strip_prefix(OSC_PREFIX_ANTESCOFO) else {
            return Event::new(
                EventKind::Unknown,
                EventData::List(msg.args.iter().map(Value::from_osc).collect()),
            )
            .with_address(msg.addr.clone());
        };

        let kind = EventKind::from_message(message_type);

        if kind == EventKind::ActionTrace {
            match ActionTrace::from_args(&msg.args) {
                Ok(trace) => {
                    return Event::new(kind, EventData::ActionTrace(trace))
                        .with_address(msg.addr.clone());
                }
                Err(e) => log::debug!("Decoding {} generically: {}", msg.addr, e),
            }
        }

        let data = match msg.args.as_slice() {
            [] => EventData::Empty,
            [single] => EventData::Single(Value::from_osc(single)),
            many => EventData::List(many.iter().map(Value::from_osc).collect()),
        };
        Event::new(kind, data).with_address(msg.addr.clone())
    }

    /// Decode every message in a packet, flattening bundles in order.
    pub fn from_osc_packet(packet: &OscPacket) -> Vec<Event> {
        let mut events = Vec::new();
        collect_events(packet, &mut events);
        events
    }

    /// Numeric payload, for events like tempo or beat position.
    pub fn as_f64(&self) -> Option<f64> {
        match &self.data {
            EventData::Single(v) => v.as_f64(),
            _ => None,
        }
    }

    pub fn action_trace(&self) -> Option<&ActionTrace> {
        match &self.data {
            EventData::ActionTrace(trace) => Some(trace),
            _ => None,
        }
    }
}

fn collect_events(packet: &OscPacket, out: &mut Vec<Event>) {
    match packet {
        OscPacket::Message(msg) => out.push(Event::from_osc_message(msg)),
        OscPacket::Bundle(bundle) => {
            for inner in &bundle.content {
                collect_events(inner, out);
            }
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.data {
            EventData::Empty => write!(f, "{}", self.kind),
            EventData::Single(v) => write!(f, "{} {}", self.kind, v),
            EventData::List(values) => {
                write!(f, "{}", self.kind)?;
                for v in values {
                    write!(f, " {}", v)?;
                }
                Ok(())
            }
            EventData::ActionTrace(t) => write!(
                f,
                "{} {} ({}) in {} now={} rnow={} {}",
                self.kind, t.action_name, t.trace_type, t.father_name, t.now, t.rnow, t.message
            ),
        }?;
        if self.kind == EventKind::Unknown {
            if let Some(addr) = &self.raw_address {
                write!(f, " [{}]", addr)?;
            }
        }
        Ok(())
    }
}

/// Callback invoked for dispatched events.
pub type EventHandler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Token returned by [`EventDispatcher::subscribe`], used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

#[derive(Default)]
struct HandlerTable {
    by_kind: HashMap<EventKind, Vec<(HandlerId, EventHandler)>>,
    global: Vec<(HandlerId, EventHandler)>,
}

/// Routes events to subscribed handlers.
///
/// Clones share the same handler table, so the listener thread and the
/// client can hold the dispatcher at the same time.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    table: Arc<RwLock<HandlerTable>>,
    next_id: Arc<AtomicU64>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one kind of event, or to every event with `None`.
    pub fn subscribe<F>(&self, kind: Option<EventKind>, handler: F) -> HandlerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handler: EventHandler = Arc::new(handler);
        let mut table = self.table.write().unwrap_or_else(|e| e.into_inner());
        match kind {
            Some(kind) => table.by_kind.entry(kind).or_default().push((id, handler)),
            None => table.global.push((id, handler)),
        }
        log::debug!("Subscribed handler {:?} to {:?}", id, kind);
        id
    }

    /// Remove a handler. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: HandlerId) -> bool {
        let mut table = self.table.write().unwrap_or_else(|e| e.into_inner());
        let before = table.global.len();
        table.global.retain(|(hid, _)| *hid != id);
        let mut removed = table.global.len() != before;
        for handlers in table.by_kind.values_mut() {
            let before = handlers.len();
            handlers.retain(|(hid, _)| *hid != id);
            removed |= handlers.len() != before;
        }
        log::debug!("Unsubscribed handler {:?} (found: {})", id, removed);
        removed
    }

    /// Deliver an event to global handlers, then to handlers of its kind.
    ///
    /// A handler that panics is logged and skipped; the rest still run.
    pub fn dispatch(&self, event: &Event) {
        log::debug!("Dispatching event: {}", event);

        // Snapshot so handlers may (un)subscribe without deadlocking.
        let (global, specific) = {
            let table = self.table.read().unwrap_or_else(|e| e.into_inner());
            let specific = table
                .by_kind
                .get(&event.kind)
                .cloned()
                .unwrap_or_default();
            (table.global.clone(), specific)
        };

        for (id, handler) in &global {
            if panic::catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                log::error!("Error in global event handler {:?}", id);
            }
        }
        for (id, handler) in &specific {
            if panic::catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                log::error!("Error in event handler {:?} for {}", id, event.kind);
            }
        }
    }

    /// Remove every handler.
    pub fn clear(&self) {
        let mut table = self.table.write().unwrap_or_else(|e| e.into_inner());
        table.by_kind.clear();
        table.global.clear();
        log::debug!("Cleared all event handlers");
    }

    /// Number of registered handlers (global and per kind).
    pub fn handler_count(&self) -> usize {
        let table = self.table.read().unwrap_or_else(|e| e.into_inner());
        table.global.len() + table.by_kind.values().map(Vec::len).sum::<usize>()
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("handlers", &self.handler_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn msg(addr: &str, args: Vec<OscType>) -> OscMessage {
        OscMessage {
            addr: addr.to_string(),
            args,
        }
    }

    #[test]
    fn test_kind_from_message() {
        assert_eq!(EventKind::from_message("tempo"), EventKind::Tempo);
        assert_eq!(EventKind::from_message("stop"), EventKind::Stop);
        assert_eq!(EventKind::from_message("event_beatpos"), EventKind::BeatPosition);
        assert_eq!(EventKind::from_message("unknown_type"), EventKind::Unknown);
        assert_eq!("loadscore".parse::<EventKind>(), Ok(EventKind::LoadScore));
    }

    #[test]
    fn test_decode_single_value() {
        let event = Event::from_osc_message(&msg("/antescofo/tempo", vec![OscType::Float(120.0)]));
        assert_eq!(event.kind, EventKind::Tempo);
        assert_eq!(event.as_f64(), Some(120.0));
        assert_eq!(event.raw_address.as_deref(), Some("/antescofo/tempo"));
    }

    #[test]
    fn test_decode_list_and_empty() {
        let event = Event::from_osc_message(&msg(
            "/antescofo/pitch",
            vec![OscType::Int(60), OscType::Int(62)],
        ));
        assert_eq!(
            event.data,
            EventData::List(vec![Value::Int(60), Value::Int(62)])
        );

        let event = Event::from_osc_message(&msg("/antescofo/stop", vec![]));
        assert_eq!(event.kind, EventKind::Stop);
        assert_eq!(event.data, EventData::Empty);
    }

    #[test]
    fn test_decode_action_trace() {
        let event = Event::from_osc_message(&msg(
            "/antescofo/action_trace",
            vec![
                OscType::String("my_action".into()),
                OscType::String("message".into()),
                OscType::String("parent".into()),
                OscType::Float(10.5),
                OscType::Double(2.25),
                OscType::String("test message".into()),
            ],
        ));
        assert_eq!(event.kind, EventKind::ActionTrace);
        let trace = event.action_trace().expect("trace");
        assert_eq!(trace.action_name, "my_action");
        assert_eq!(trace.trace_type, TraceType::Message);
        assert_eq!(trace.father_name, "parent");
        assert!((trace.now - 10.5).abs() < 1e-6);
        assert!((trace.rnow - 2.25).abs() < 1e-6);
        assert_eq!(trace.message, "test message");
    }

    #[test]
    fn test_action_trace_rejects_bad_times() {
        let args = vec![
            OscType::String("a".into()),
            OscType::String("loop".into()),
            OscType::String("top".into()),
            OscType::String("soon".into()),
            OscType::Float(1.0),
            OscType::String("".into()),
        ];
        assert!(matches!(ActionTrace::from_args(&args), Err(Error::InvalidMessage(_))));
        assert!(matches!(ActionTrace::from_args(&args[..2]), Err(Error::InvalidMessage(_))));
    }

    #[test]
    fn test_short_action_trace_is_generic() {
        let event = Event::from_osc_message(&msg(
            "/antescofo/action_trace",
            vec![OscType::String("only".into())],
        ));
        assert_eq!(event.kind, EventKind::ActionTrace);
        assert!(event.action_trace().is_none());
        assert_eq!(event.data, EventData::Single(Value::from("only")));
    }

    #[test]
    fn test_decode_foreign_address() {
        let event = Event::from_osc_message(&msg("/synth/play", vec![OscType::Int(440)]));
        assert_eq!(event.kind, EventKind::Unknown);
        assert_eq!(event.data, EventData::List(vec![Value::Int(440)]));
        assert_eq!(event.raw_address.as_deref(), Some("/synth/play"));
    }

    #[test]
    fn test_bundles_are_flattened() {
        let packet = OscPacket::Bundle(rosc::OscBundle {
            timetag: rosc::OscTime::from((0, 1)),
            content: vec![
                OscPacket::Message(msg("/antescofo/rnow", vec![OscType::Float(1.0)])),
                OscPacket::Message(msg("/antescofo/tempo", vec![OscType::Float(60.0)])),
            ],
        });
        let kinds: Vec<_> = Event::from_osc_packet(&packet).iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::Rnow, EventKind::Tempo]);
    }

    #[test]
    fn test_subscribe_and_dispatch() {
        let dispatcher = EventDispatcher::new();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        dispatcher.subscribe(Some(EventKind::Tempo), move |e| {
            sink.lock().unwrap().push(e.clone());
        });

        let tempo = Event::new(EventKind::Tempo, EventData::Single(Value::Float(120.0)));
        dispatcher.dispatch(&tempo);
        dispatcher.dispatch(&Event::new(EventKind::Stop, EventData::Empty));

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0], tempo);
    }

    #[test]
    fn test_global_handlers_run_first() {
        let dispatcher = EventDispatcher::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = order.clone();
        dispatcher.subscribe(Some(EventKind::Tempo), move |_| o.lock().unwrap().push("specific"));
        let o = order.clone();
        dispatcher.subscribe(None, move |_| o.lock().unwrap().push("global"));

        dispatcher.dispatch(&Event::new(EventKind::Tempo, EventData::Empty));
        dispatcher.dispatch(&Event::new(EventKind::Stop, EventData::Empty));

        assert_eq!(*order.lock().unwrap(), vec!["global", "specific", "global"]);
    }

    #[test]
    fn test_unsubscribe_and_clear() {
        let dispatcher = EventDispatcher::new();
        let count = Arc::new(AtomicU64::new(0));

        let c = count.clone();
        let id = dispatcher.subscribe(Some(EventKind::Stop), move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        let c = count.clone();
        dispatcher.subscribe(None, move |_| {
            c.fetch_add(10, Ordering::SeqCst);
        });
        assert_eq!(dispatcher.handler_count(), 2);

        assert!(dispatcher.unsubscribe(id));
        assert!(!dispatcher.unsubscribe(id));
        dispatcher.dispatch(&Event::new(EventKind::Stop, EventData::Empty));
        assert_eq!(count.load(Ordering::SeqCst), 10);

        dispatcher.clear();
        assert_eq!(dispatcher.handler_count(), 0);
        dispatcher.dispatch(&Event::new(EventKind::Stop, EventData::Empty));
        assert_eq!(count.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_panicking_handler_does_not_stop_others() {
        let dispatcher = EventDispatcher::new();
        let count = Arc::new(AtomicU64::new(0));

        dispatcher.subscribe(Some(EventKind::Tempo), |_| panic!("handler failure"));
        let c = count.clone();
        dispatcher.subscribe(Some(EventKind::Tempo), move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.dispatch(&Event::new(EventKind::Tempo, EventData::Empty));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handler_can_unsubscribe_itself() {
        let dispatcher = EventDispatcher::new();
        let slot: Arc<Mutex<Option<HandlerId>>> = Arc::new(Mutex::new(None));
        let d = dispatcher.clone();
        let s = slot.clone();
        let id = dispatcher.subscribe(None, move |_| {
            if let Some(id) = *s.lock().unwrap() {
                d.unsubscribe(id);
            }
        });
        *slot.lock().unwrap() = Some(id);

        dispatcher.dispatch(&Event::new(EventKind::Stop, EventData::Empty));
        assert_eq!(dispatcher.handler_count(), 0);
    }
}
