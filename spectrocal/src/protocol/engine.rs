//! Command/response engine.
//!
//! One command is outstanding at a time: [`ProtocolEngine::send`] takes
//! `&mut self` and holds the connection's only subscription for the whole
//! cycle.
//!
//! ## Timing
//!
//! ```text
//! t=0             window             ceiling
//!  |-- transmit --|                   |
//!  |<-- collect ->|  -> lines         |
//!  |<------------ collect ----------->|  -> Timeout (window > ceiling)
//! ```
//!
//! The collection window starts just before the command bytes go out and
//! is cut short by the ceiling. A window that would outlive the ceiling
//! always ends in [`Error::Timeout`], never in partial lines.

use std::time::{Duration, Instant};

use log::{debug, trace};

use crate::connection::{CEILING_TIMEOUT, Connection};
use crate::error::{Error, Result};
use crate::port::Port;
use crate::protocol::{Command, frame, split_response};

/// Engine timing configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound on a whole send/response cycle.
    pub ceiling: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ceiling: CEILING_TIMEOUT,
        }
    }
}

/// How a collection window relates to the ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    /// The window closes first; the response is whatever arrived by then.
    Complete(Duration),
    /// The ceiling closes first; the send fails with a timeout at this point.
    Truncated(Duration),
}

impl Collection {
    /// Resolve a window against a ceiling. A window equal to the ceiling
    /// still completes.
    pub fn plan(window: Duration, ceiling: Duration) -> Self {
        if window > ceiling {
            Self::Truncated(ceiling)
        } else {
            Self::Complete(window)
        }
    }

    /// Time spent collecting before the send resolves.
    pub fn duration(self) -> Duration {
        match self {
            Self::Complete(d) | Self::Truncated(d) => d,
        }
    }
}

/// Issues commands over an exclusively owned [`Connection`].
pub struct ProtocolEngine<P: Port> {
    connection: Connection<P>,
    config: EngineConfig,
}

impl<P: Port> ProtocolEngine<P> {
    /// Create an engine over an open connection.
    pub fn new(connection: Connection<P>) -> Self {
        Self::with_config(connection, EngineConfig::default())
    }

    /// Create an engine with explicit timing.
    pub fn with_config(connection: Connection<P>, config: EngineConfig) -> Self {
        Self { connection, config }
    }

    /// Engine timing.
    pub fn config(&self) -> EngineConfig {
        self.config
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Connection<P> {
        &self.connection
    }

    /// Close the underlying connection.
    pub fn close(&mut self) {
        self.connection.close();
    }

    /// Send `command` and collect response lines for `window`.
    ///
    /// Empty lines and echoes of the command are dropped. Fails with
    /// [`Error::Timeout`] if the ceiling is reached first, and with a
    /// transport error if the line fails.
    pub fn send(&mut self, command: &str, window: Duration) -> Result<Vec<String>> {
        let bytes = frame(command)?;
        let plan = Collection::plan(window, self.config.ceiling);

        let ceiling = self.config.ceiling;
        let started = Instant::now();
        let ceiling_at = started + ceiling;
        debug!("-> {command} (window {} ms)", window.as_millis());

        let mut buffer = Vec::new();
        {
            let mut subscription = self
                .connection
                .subscribe(|chunk| buffer.extend_from_slice(chunk))?;
            subscription.transmit(&bytes)?;
            if Instant::now() >= ceiling_at {
                return Err(timeout_error(command, ceiling));
            }
            subscription.pump_until(started + plan.duration())?;
        }

        if let Collection::Truncated(_) = plan {
            trace!(
                "Discarding {} byte(s) collected for {command}",
                buffer.len()
            );
            return Err(timeout_error(command, ceiling));
        }

        let lines = split_response(&buffer, command);
        debug!("<- {command}: {} line(s)", lines.len());
        for line in &lines {
            trace!("   {line:?}");
        }
        Ok(lines)
    }

    /// Send a protocol command with an explicit window.
    pub fn request(&mut self, command: Command, window: Duration) -> Result<Vec<String>> {
        self.send(command.token(), window)
    }
}

fn timeout_error(command: &str, ceiling: Duration) -> Error {
    Error::Timeout(format!(
        "{command} got no complete response within {} ms",
        ceiling.as_millis()
    ))
}
