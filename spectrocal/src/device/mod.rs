//! Instrument adapter discovery.
//!
//! The instrument is reached through a CP210x USB-UART adapter board
//! (VID `10C4`, PID `EA60`). Discovery polls the OS port list until an
//! acceptable number of matching adapters is present.
//!
//! ## Example
//!
//! ```rust,no_run
//! use spectrocal::device::{DiscoveryConfig, PortWatcher};
//! use spectrocal::port::NativePortLister;
//!
//! let watcher = PortWatcher::new(NativePortLister, DiscoveryConfig::default());
//! let port = watcher.wait_for_port()?;
//! println!("Using {}", port.name);
//! # Ok::<(), spectrocal::Error>(())
//! ```

use std::fmt;
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use log::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::is_interrupted_requested;
use crate::port::{PortInfo, PortLister};

/// Interval between discovery polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Matching adapters tolerated at once; more than this is treated as ambiguous.
pub const MAX_MATCHES: usize = 2;

/// USB vendor/product identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UsbId {
    /// USB Vendor ID.
    pub vid: u16,
    /// USB Product ID.
    pub pid: u16,
}

impl UsbId {
    /// Silicon Labs CP210x bridge on the instrument's adapter board.
    pub const INSTRUMENT_ADAPTER: Self = Self {
        vid: 0x10C4,
        pid: 0xEA60,
    };

    /// Create an identity.
    pub const fn new(vid: u16, pid: u16) -> Self {
        Self { vid, pid }
    }

    /// Parse one hex ID, case-insensitive, with or without `0x`.
    pub fn parse_hex(s: &str) -> Result<u16> {
        let s = s.trim();
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        u16::from_str_radix(digits, 16)
            .map_err(|e| Error::Config(format!("invalid USB id {s:?}: {e}")))
    }

    /// Whether `port` reports this identity.
    pub fn matches(&self, port: &PortInfo) -> bool {
        port.vid == Some(self.vid) && port.pid == Some(self.pid)
    }
}

impl Default for UsbId {
    fn default() -> Self {
        Self::INSTRUMENT_ADAPTER
    }
}

impl fmt::Display for UsbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}:{:04X}", self.vid, self.pid)
    }
}

impl FromStr for UsbId {
    type Err = Error;

    /// Parse `VID:PID`, e.g. `10c4:ea60`.
    fn from_str(s: &str) -> Result<Self> {
        let (vid, pid) = s
            .split_once(':')
            .ok_or_else(|| Error::Config(format!("expected VID:PID, got {s:?}")))?;
        Ok(Self::new(Self::parse_hex(vid)?, Self::parse_hex(pid)?))
    }
}

/// Outcome of one discovery poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSelection {
    /// No adapter is plugged in.
    NoMatch,
    /// An adapter was chosen.
    Selected(PortInfo),
    /// More adapters than allowed are plugged in.
    TooMany(usize),
}

/// Pick the adapter to use from a port list.
///
/// Between one and `max_matches` matches selects the first match in
/// enumeration order.
pub fn select_port(ports: Vec<PortInfo>, usb: UsbId, max_matches: usize) -> PortSelection {
    let matching: Vec<PortInfo> = ports
        .into_iter()
        .filter(|p| usb.matches(p))
        .collect();

    match matching.len() {
        0 => PortSelection::NoMatch,
        n if n > max_matches => PortSelection::TooMany(n),
        _ => matching
            .into_iter()
            .next()
            .map_or(PortSelection::NoMatch, PortSelection::Selected),
    }
}

/// Discovery configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Adapter identity to look for.
    pub usb: UsbId,
    /// Pause between polls.
    pub poll_interval: Duration,
    /// Largest number of simultaneous matches still accepted.
    pub max_matches: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            usb: UsbId::INSTRUMENT_ADAPTER,
            poll_interval: POLL_INTERVAL,
            max_matches: MAX_MATCHES,
        }
    }
}

/// Polls a [`PortLister`] for the instrument adapter.
#[derive(Debug, Clone)]
pub struct PortWatcher<L> {
    lister: L,
    config: DiscoveryConfig,
}

impl<L: PortLister> PortWatcher<L> {
    /// Create a watcher.
    pub fn new(lister: L, config: DiscoveryConfig) -> Self {
        Self { lister, config }
    }

    /// Discovery configuration.
    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// All ports matching the adapter identity right now.
    pub fn candidates(&self) -> Vec<PortInfo> {
        self.list()
            .into_iter()
            .filter(|p| self.config.usb.matches(p))
            .collect()
    }

    /// Poll once.
    pub fn poll(&self) -> PortSelection {
        select_port(self.list(), self.config.usb, self.config.max_matches)
    }

    /// Poll until an adapter can be selected.
    ///
    /// "Nothing plugged in" and "too many plugged in" are not errors; both
    /// wait `poll_interval` and poll again. Only an interruption request
    /// ends the wait early.
    pub fn wait_for_port(&self) -> Result<PortInfo> {
        loop {
            if is_interrupted_requested() {
                return Err(Error::Interrupted);
            }

            match self.poll() {
                PortSelection::Selected(port) => {
                    info!("Found instrument adapter on {}", port.name);
                    return Ok(port);
                },
                PortSelection::NoMatch => {
                    warn!("No UART adapter board found ({})", self.config.usb);
                },
                PortSelection::TooMany(n) => {
                    warn!(
                        "Found too many UART adapter boards ({n}, limit {})",
                        self.config.max_matches
                    );
                },
            }

            thread::sleep(self.config.poll_interval);
        }
    }

    fn list(&self) -> Vec<PortInfo> {
        match self.lister.list_ports() {
            Ok(ports) => {
                trace!("{} serial port(s) present", ports.len());
                ports
            },
            Err(e) => {
                debug!("Failed to enumerate serial ports: {e}");
                Vec::new()
            },
        }
    }
}

/// Format ports for display, marking instrument adapters.
pub fn format_port_list(ports: &[PortInfo], usb: UsbId) -> Vec<String> {
    ports
        .iter()
        .map(|port| {
            let device_info = if usb.matches(port) {
                " [instrument adapter]".to_string()
            } else if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
                format!(" [VID:{vid:04X} PID:{pid:04X}]")
            } else {
                String::new()
            };

            let product_info = port
                .product
                .as_ref()
                .map(|p| format!(" - {p}"))
                .unwrap_or_default();

            format!("{}{}{}", port.name, device_info, product_info)
        })
        .collect()
}
