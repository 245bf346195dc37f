//! Process signals the filter reacts to while running.
//!
//! - **SIGINT** / **SIGTERM**: graceful shutdown
//! - **SIGHUP**: reload the configuration file

use tokio::{
    signal::unix::{Signal, SignalKind, signal},
    sync::mpsc,
};
use tracing::info;

use crate::error::{PortblockError, Result};

/// What a received signal asks the running filter to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Shutdown,
    Reload,
}

/// Installs the SIGINT, SIGTERM and SIGHUP handlers and forwards each signal
/// as a [`Trigger`] on the returned channel.
///
/// Handlers are installed before this returns, so a signal arriving right
/// after cannot terminate the process with the default disposition.
pub fn listen() -> Result<mpsc::Receiver<Trigger>> {
    let sigint = install(SignalKind::interrupt(), "SIGINT")?;
    let sigterm = install(SignalKind::terminate(), "SIGTERM")?;
    let sighup = install(SignalKind::hangup(), "SIGHUP")?;

    Ok(forward(vec![
        (sigint, "SIGINT", Trigger::Shutdown),
        (sigterm, "SIGTERM", Trigger::Shutdown),
        (sighup, "SIGHUP", Trigger::Reload),
    ]))
}

fn install(kind: SignalKind, name: &str) -> Result<Signal> {
    signal(kind).map_err(|e| PortblockError::internal(format!("failed to install {name} handler: {e}")))
}

/// Spawns one task per installed handler. Each task stops once the receiver
/// is dropped.
fn forward(handlers: Vec<(Signal, &'static str, Trigger)>) -> mpsc::Receiver<Trigger> {
    let (tx, rx) = mpsc::channel::<Trigger>(4);

    for (mut sig, name, trigger) in handlers {
        let tx = tx.clone();
        tokio::spawn(async move {
            while sig.recv().await.is_some() {
                info!(
                    event.name = "signal.received",
                    signal = name,
                    trigger = ?trigger,
                    "received signal"
                );
                if tx.send(trigger).await.is_err() {
                    break;
                }
            }
        });
    }

    rx
}
