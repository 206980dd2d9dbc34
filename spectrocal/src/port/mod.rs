//! Port abstraction over the physical serial line.
//!
//! The protocol layer only ever talks to a [`Port`], so the engine and the
//! interrogation loop can be driven by the native `serialport` backend in
//! production and by a scripted port in tests.
//!
//! ```text
//! +----------------------+
//! | Interrogation loop   |
//! +----------+-----------+
//!            |
//!            v
//! +----------+-----------+
//! | Protocol engine      |
//! +----------+-----------+
//!            |
//!            v
//! +----------+-----------+
//! | Connection / Port    |
//! +----------+-----------+
//!            |
//!            v
//! +----------+-----------+
//! | NativePort           |
//! |   (serialport)       |
//! +----------------------+
//! ```

pub mod native;

#[cfg(test)]
pub(crate) mod mock;

use std::io::{Read, Write};
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, StopBits};

use crate::error::Result;

/// Baud rate the instrument firmware listens on.
pub const INSTRUMENT_BAUD: u32 = 115_200;

/// Serial line configuration.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyUSB0", "COM3").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Per-read timeout handed to the OS driver.
    pub read_timeout: Duration,
    /// Data bits.
    pub data_bits: DataBits,
    /// Parity.
    pub parity: Parity,
    /// Stop bits.
    pub stop_bits: StopBits,
    /// Flow control. CTS/DSR are never consulted.
    pub flow_control: FlowControl,
}

impl SerialConfig {
    /// The fixed 115200-8-N-1 settings the instrument requires.
    pub fn for_instrument(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate: INSTRUMENT_BAUD,
            read_timeout: Duration::from_millis(20),
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
        }
    }
}

/// Serial port information as reported by the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PortInfo {
    /// Port name/path.
    pub name: String,
    /// USB vendor ID (if available).
    pub vid: Option<u16>,
    /// USB product ID (if available).
    pub pid: Option<u16>,
    /// Manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Product string (if available).
    pub product: Option<String>,
    /// Serial number (if available).
    pub serial_number: Option<String>,
}

impl PortInfo {
    /// A port with no USB metadata.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial_number: None,
        }
    }

    /// A USB port with the given vendor/product IDs.
    #[must_use]
    pub fn with_usb(mut self, vid: u16, pid: u16) -> Self {
        self.vid = Some(vid);
        self.pid = Some(pid);
        self
    }
}

/// An open serial line.
pub trait Port: Read + Write + Send {
    /// Set the per-read timeout.
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Get the current per-read timeout.
    fn timeout(&self) -> Duration;

    /// Get the port name/path.
    fn name(&self) -> &str;

    /// Set DTR (Data Terminal Ready) pin state.
    fn set_dtr(&mut self, level: bool) -> Result<()>;

    /// Set RTS (Request To Send) pin state.
    fn set_rts(&mut self, level: bool) -> Result<()>;

    /// Close the port and release resources.
    ///
    /// Calling this on an already closed port is a no-op.
    fn close(&mut self) -> Result<()>;

    /// Write all bytes and flush.
    fn write_all_bytes(&mut self, buf: &[u8]) -> Result<()> {
        std::io::Write::write_all(self, buf)?;
        std::io::Write::flush(self)?;
        Ok(())
    }
}

/// Source of candidate serial ports.
pub trait PortLister {
    /// List all serial ports currently present.
    fn list_ports(&self) -> Result<Vec<PortInfo>>;
}

pub use native::{NativePort, NativePortLister};
