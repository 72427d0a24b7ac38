//! OS termination signals

use crate::error::CoreResult;
use std::fmt;
use tracing::info;

/// Signal that triggered a shutdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// SIGINT or Ctrl+C
    Interrupt,
    /// SIGTERM
    Terminate,
    /// SIGHUP
    Hangup,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Interrupt => write!(f, "interrupt"),
            Signal::Terminate => write!(f, "terminated"),
            Signal::Hangup => write!(f, "hangup"),
        }
    }
}

/// Waits for exactly one termination signal
#[cfg(unix)]
pub async fn wait_for_signal() -> CoreResult<Signal> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sighup = signal(SignalKind::hangup())?;

    let received = tokio::select! {
        _ = sigterm.recv() => Signal::Terminate,
        _ = sigint.recv() => Signal::Interrupt,
        _ = sighup.recv() => Signal::Hangup,
    };
    info!(signal = %received, "received shutdown signal");
    Ok(received)
}

/// Waits for exactly one termination signal
#[cfg(not(unix))]
pub async fn wait_for_signal() -> CoreResult<Signal> {
    tokio::signal::ctrl_c().await?;
    info!(signal = %Signal::Interrupt, "received shutdown signal");
    Ok(Signal::Interrupt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_names() {
        assert_eq!(Signal::Interrupt.to_string(), "interrupt");
        assert_eq!(Signal::Terminate.to_string(), "terminated");
        assert_eq!(Signal::Hangup.to_string(), "hangup");
    }
}
