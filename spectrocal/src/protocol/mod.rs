//! Line-oriented ASCII command protocol.
//!
//! Commands are bare uppercase tokens terminated by CRLF. The instrument has
//! no acknowledgement or length framing, so a response is whatever arrives
//! during a fixed collection window after the command is sent.
//!
//! ## Frame Format
//!
//! ```text
//! host -> instrument:   <TOKEN>\r\n
//! instrument -> host:   [<TOKEN>\r\n] <line>\r\n <line>\r\n ...
//! ```
//!
//! Some firmware echoes the command back; echoed lines are dropped.

pub mod decode;
pub mod engine;

use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};

/// Line terminator used in both directions.
pub const LINE_ENDING: &str = "\r\n";

/// Commands of the instrument's calibration protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Wake the instrument into command mode.
    Start,
    /// Request the serial number.
    Serial,
    /// Request the firmware version.
    Version,
    /// Request the black-point calibration table.
    CheckBlackPoint,
    /// Request the white-point calibration table.
    CheckWhitePoint,
}

impl Command {
    /// All commands in session order.
    pub const SEQUENCE: [Self; 5] = [
        Self::Start,
        Self::Serial,
        Self::Version,
        Self::CheckBlackPoint,
        Self::CheckWhitePoint,
    ];

    /// Wire token.
    pub fn token(self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::Serial => "SER",
            Self::Version => "VER",
            Self::CheckBlackPoint => "CHECKBLACKPOINT",
            Self::CheckWhitePoint => "CHECKWHITEPOINT",
        }
    }

    /// Collection window the instrument needs to finish answering.
    pub fn default_window(self) -> Duration {
        match self {
            Self::Start | Self::Serial | Self::Version => Duration::from_millis(500),
            Self::CheckBlackPoint | Self::CheckWhitePoint => Duration::from_secs(1),
        }
    }

    /// Look up a command by its wire token.
    pub fn from_token(token: &str) -> Option<Self> {
        Self::SEQUENCE
            .into_iter()
            .find(|c| c.token() == token)
    }
}

impl AsRef<str> for Command {
    fn as_ref(&self) -> &str {
        self.token()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Build the bytes sent for `token`.
///
/// Tokens are uppercase ASCII with no whitespace, so a token always forms
/// exactly one line.
pub fn frame(token: &str) -> Result<Vec<u8>> {
    if token.is_empty()
        || !token
            .bytes()
            .all(|b| b.is_ascii_graphic() && !b.is_ascii_lowercase())
    {
        return Err(Error::InvalidCommand(token.to_string()));
    }

    let mut bytes = Vec::with_capacity(token.len() + LINE_ENDING.len());
    bytes.extend_from_slice(token.as_bytes());
    bytes.extend_from_slice(LINE_ENDING.as_bytes());
    Ok(bytes)
}

/// Split a collected buffer into response lines for `command`.
pub fn split_response(buffer: &[u8], command: &str) -> Vec<String> {
    let text = String::from_utf8_lossy(buffer);
    filter_lines(text.split(LINE_ENDING), command)
}

/// Drop empty lines and echoes of `command`, keeping order.
pub fn filter_lines<I, S>(lines: I, command: &str) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .filter(|line| {
            let line = line.as_ref();
            !line.is_empty() && line != command
        })
        .map(|line| line.as_ref().to_string())
        .collect()
}
