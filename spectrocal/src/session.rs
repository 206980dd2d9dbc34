//! Interrogation loop.
//!
//! A session runs the fixed command sequence against one instrument:
//!
//! 1. `START` (response ignored)
//! 2. `SER` -> serial number
//! 3. `VER` -> firmware version
//! 4. `CHECKBLACKPOINT` -> black-point table
//! 5. `CHECKWHITEPOINT` -> white-point table
//!
//! A command that yields no usable lines is sent again according to the
//! session's [`RetryPolicy`] (default: forever, no pause). A timeout or
//! transport failure anywhere abandons the pass, waits `restart_delay`
//! and starts over from `START`.

use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::calibration::DeviceInfo;
use crate::error::{Error, Result};
use crate::is_interrupted_requested;
use crate::port::Port;
use crate::protocol::decode::{
    decode_black_point, decode_firmware, decode_serial, decode_white_point,
};
use crate::protocol::engine::ProtocolEngine;
use crate::protocol::Command;

/// Delay before a failed session is restarted.
pub const RESTART_DELAY: Duration = Duration::from_secs(1);

/// How often a command that produced no lines is re-sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per command, `None` for no limit.
    pub max_attempts: Option<u32>,
    /// Pause between attempts.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Resend immediately, without limit.
    pub const fn forever() -> Self {
        Self {
            max_attempts: None,
            backoff: Duration::ZERO,
        }
    }

    /// Give up after `max_attempts` sends.
    pub const fn bounded(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            backoff: Duration::ZERO,
        }
    }

    /// Pause between attempts.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Whether another send is allowed after `attempts` sends.
    pub fn allows_another(&self, attempts: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempts < max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::forever()
    }
}

/// Collection window for each command of the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandWindows {
    /// `START` window.
    pub start: Duration,
    /// `SER` window.
    pub serial: Duration,
    /// `VER` window.
    pub version: Duration,
    /// `CHECKBLACKPOINT` window.
    pub black_point: Duration,
    /// `CHECKWHITEPOINT` window.
    pub white_point: Duration,
}

impl CommandWindows {
    /// The same window for every command.
    pub fn uniform(window: Duration) -> Self {
        Self {
            start: window,
            serial: window,
            version: window,
            black_point: window,
            white_point: window,
        }
    }

    /// Window configured for `command`.
    pub fn for_command(&self, command: Command) -> Duration {
        match command {
            Command::Start => self.start,
            Command::Serial => self.serial,
            Command::Version => self.version,
            Command::CheckBlackPoint => self.black_point,
            Command::CheckWhitePoint => self.white_point,
        }
    }
}

impl Default for CommandWindows {
    fn default() -> Self {
        Self {
            start: Command::Start.default_window(),
            serial: Command::Serial.default_window(),
            version: Command::Version.default_window(),
            black_point: Command::CheckBlackPoint.default_window(),
            white_point: Command::CheckWhitePoint.default_window(),
        }
    }
}

/// Session configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Per-command collection windows.
    pub windows: CommandWindows,
    /// Pause before restarting after a timeout or transport failure.
    pub restart_delay: Duration,
    /// Policy for commands that return no lines.
    pub incomplete_retry: RetryPolicy,
    /// Stop after this many failed passes, `None` to keep going.
    pub max_sessions: Option<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            windows: CommandWindows::default(),
            restart_delay: RESTART_DELAY,
            incomplete_retry: RetryPolicy::forever(),
            max_sessions: None,
        }
    }
}

/// Progress notifications emitted while a session runs.
#[derive(Debug)]
pub enum SessionEvent<'a> {
    /// A pass over the sequence is starting (1-based).
    PassStarted(u32),
    /// A command produced no lines and is being sent again.
    Resending {
        /// Command being resent.
        command: Command,
        /// Attempts made so far.
        attempts: u32,
    },
    /// Serial number decoded.
    Serial(&'a str),
    /// Firmware version decoded.
    Firmware(&'a str),
    /// Black-point table decoded with this many points.
    BlackPoint(usize),
    /// White-point table decoded with this many points.
    WhitePoint(usize),
    /// The pass failed and the sequence will restart after `delay`.
    Restarting {
        /// Failure that aborted the pass.
        error: &'a Error,
        /// Pause before the next pass.
        delay: Duration,
    },
}

/// Runs interrogation sequences.
#[derive(Debug, Clone, Default)]
pub struct Session {
    config: SessionConfig,
}

impl Session {
    /// Create a session runner.
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Repeat the sequence until one pass completes.
    ///
    /// Timeouts and transport failures restart the sequence from `START`.
    /// Any other error, or an interruption request, is returned.
    pub fn run<P: Port>(&self, engine: &mut ProtocolEngine<P>) -> Result<DeviceInfo> {
        self.run_with_progress(engine, &mut |_| {})
    }

    /// [`run`](Self::run) with progress notifications.
    pub fn run_with_progress<P: Port>(
        &self,
        engine: &mut ProtocolEngine<P>,
        on_event: &mut dyn FnMut(SessionEvent<'_>),
    ) -> Result<DeviceInfo> {
        let mut pass = 0u32;

        loop {
            if is_interrupted_requested() {
                return Err(Error::Interrupted);
            }
            pass += 1;
            on_event(SessionEvent::PassStarted(pass));

            match self.run_once(engine, on_event) {
                Ok(info) => return Ok(info),
                Err(e) if e.is_session_recoverable() => {
                    warn!("Unable to detect instrument: {e}");
                    if self
                        .config
                        .max_sessions
                        .is_some_and(|max| pass >= max)
                    {
                        return Err(e);
                    }
                    on_event(SessionEvent::Restarting {
                        error: &e,
                        delay: self.config.restart_delay,
                    });
                    thread::sleep(self.config.restart_delay);
                },
                Err(e) => return Err(e),
            }
        }
    }

    /// One pass over the sequence. Errors are returned as-is.
    pub fn run_once<P: Port>(
        &self,
        engine: &mut ProtocolEngine<P>,
        on_event: &mut dyn FnMut(SessionEvent<'_>),
    ) -> Result<DeviceInfo> {
        let windows = &self.config.windows;

        engine.request(Command::Start, windows.start)?;

        let serial = self.query(engine, Command::Serial, on_event, decode_serial)?;
        info!("Instrument {serial}");
        on_event(SessionEvent::Serial(&serial));

        let firmware = self.query(engine, Command::Version, on_event, decode_firmware)?;
        info!("Instrument firmware {firmware}");
        on_event(SessionEvent::Firmware(&firmware));

        let black_point = self.query(engine, Command::CheckBlackPoint, on_event, decode_black_point)?;
        info!("Got black point ({} points)", black_point.len());
        on_event(SessionEvent::BlackPoint(black_point.len()));

        let white_point = self.query(engine, Command::CheckWhitePoint, on_event, decode_white_point)?;
        info!("Got white point ({} points)", white_point.len());
        on_event(SessionEvent::WhitePoint(white_point.len()));

        Ok(DeviceInfo {
            serial,
            firmware,
            black_point,
            white_point,
        })
    }

    /// Send `command` until `decode` accepts the response.
    fn query<P, T>(
        &self,
        engine: &mut ProtocolEngine<P>,
        command: Command,
        on_event: &mut dyn FnMut(SessionEvent<'_>),
        decode: fn(&[String]) -> Option<T>,
    ) -> Result<T>
    where
        P: Port,
    {
        let window = self.config.windows.for_command(command);
        let policy = self.config.incomplete_retry;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let lines = engine.request(command, window)?;
            if let Some(value) = decode(&lines) {
                return Ok(value);
            }

            if !policy.allows_another(attempts) {
                return Err(Error::IncompleteResponse {
                    command: command.token().to_string(),
                    attempts,
                });
            }
            if is_interrupted_requested() {
                return Err(Error::Interrupted);
            }

            debug!("{command}: no response, resending (attempt {attempts})");
            on_event(SessionEvent::Resending { command, attempts });
            if !policy.backoff.is_zero() {
                thread::sleep(policy.backoff);
            }
        }
    }
}
