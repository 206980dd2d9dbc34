//! # spectrocal
//!
//! Calibration data collection for bench spectro instruments.
//!
//! The instrument speaks a bare ASCII command/response protocol over a
//! USB-UART adapter at 115200-8-N-1. Responses carry no terminator or
//! length; a response is whatever arrives within a fixed collection window
//! after the command is sent. This crate provides:
//!
//! - Serial transport with bounded open and per-call byte subscriptions
//! - The command engine with per-command windows raced against a ceiling
//! - Decoders for serial, firmware, black-point and white-point responses
//! - The interrogation loop with retry-on-empty and restart-on-failure
//! - USB adapter discovery (VID `10C4`, PID `EA60`)
//!
//! ## Features
//!
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use spectrocal::Station;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Wait for the adapter, interrogate the instrument, release the line
//!     let info = Station::native().acquire()?;
//!
//!     println!("{} (firmware {})", info.serial, info.firmware);
//!     for (key, value) in info.black_point.entries() {
//!         println!("  {key} = {value}");
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod calibration;
pub mod connection;
pub mod device;
pub mod error;
pub mod port;
pub mod protocol;
pub mod session;
pub mod station;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker used by long-running library loops.
///
/// The checker should return `true` when the current operation should stop
/// (for example after receiving Ctrl-C in CLI applications). Discovery polling
/// and the interrogation loop consult it between attempts.
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_CHECKER
        .get()
        .is_some_and(|checker| checker())
}

/// Tests run in parallel, so the flag is per test thread.
#[cfg(test)]
pub(crate) fn test_set_interrupted(value: bool) {
    use std::cell::Cell;

    thread_local! {
        static TEST_INTERRUPT_FLAG: Cell<bool> = const { Cell::new(false) };
    }
    static INSTALLED: OnceLock<()> = OnceLock::new();

    INSTALLED.get_or_init(|| {
        set_interrupt_checker(|| TEST_INTERRUPT_FLAG.with(Cell::get));
    });
    TEST_INTERRUPT_FLAG.with(|flag| flag.set(value));
}

// Re-exports for convenience
pub use {
    calibration::{CalibrationMap, CalibrationPoint, DeviceInfo, Group, Reading},
    connection::{CEILING_TIMEOUT, Connection, Subscription},
    device::{DiscoveryConfig, PortSelection, PortWatcher, UsbId, format_port_list, select_port},
    error::{Error, Result},
    port::{NativePort, NativePortLister, Port, PortInfo, PortLister, SerialConfig},
    protocol::Command,
    protocol::engine::{Collection, EngineConfig, ProtocolEngine},
    session::{CommandWindows, RetryPolicy, Session, SessionConfig, SessionEvent},
    station::{Station, StationEvent},
};
