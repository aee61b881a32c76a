//! `asco listen` - print Antescofo notifications as they arrive.

use anyhow::{Context, Result};
use antescofo_core::{AntescofoClient, ClientOptions, Event, EventData};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn run(options: ClientOptions, seconds: Option<f64>, stop: Arc<AtomicBool>) -> Result<()> {
    if options.receive_port.is_none() {
        anyhow::bail!(
            "Receiving is disabled; set connection.receive = true or pass --receive-port"
        );
    }
    let deadline = match seconds {
        Some(s) if !s.is_finite() || s < 0.0 => anyhow::bail!("Invalid duration: {}", s),
        Some(s) => Some(Instant::now() + Duration::from_secs_f64(s)),
        None => None,
    };

    let mut client = connect_printing(options).context("Failed to start listening")?;

    if let Some(addr) = client.listen_addr() {
        println!("Listening for Antescofo on {} (Ctrl+C to stop)", addr);
    }

    while !stop.load(Ordering::Relaxed) {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        client.wait(POLL_INTERVAL);
    }

    client.disconnect();
    println!("Stopped listening");
    Ok(())
}

/// Connect with a printer already subscribed, so notifications sent right
/// after `ascographcomm` are not lost.
fn connect_printing(options: ClientOptions) -> antescofo_core::Result<AntescofoClient> {
    let mut client = AntescofoClient::new(options);
    let started = Instant::now();
    client.dispatcher().subscribe(None, move |event| {
        println!("[{:>8.3}s] {}", started.elapsed().as_secs_f64(), describe(event));
    });
    client.connect()?;
    Ok(client)
}

fn describe(event: &Event) -> String {
    match &event.data {
        EventData::ActionTrace(trace) => format!(
            "action {} [{}] in {} at {:.3} ({:.3} beats): {}",
            trace.action_name, trace.trace_type, trace.father_name, trace.now, trace.rnow, trace.message
        ),
        _ => event.to_string(),
    }
}
