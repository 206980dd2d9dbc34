//! Calibration measurements and the per-instrument aggregate.
//!
//! Black- and white-point tables are kept as ordered lists of typed
//! [`CalibrationPoint`]s. The dotted keys used in exports
//! (`"0.R"`, `"1.MAIN.G"`, ...) are derived from those records.

use std::collections::BTreeMap;
use std::fmt;

/// Channel group a white-point line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Group {
    /// Main sensor channel.
    Main,
    /// Auxiliary sensor channel.
    Aux,
}

impl Group {
    /// Tag as it appears in the instrument's output.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Main => "MAIN",
            Self::Aux => "AUX",
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A decoded integer reading, or the not-a-number sentinel for tokens that
/// were not numeric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reading(Option<i64>);

impl Reading {
    /// The not-a-number sentinel.
    pub const NAN: Self = Self(None);

    /// A valid reading.
    pub fn new(value: i64) -> Self {
        Self(Some(value))
    }

    /// Integer value, `None` for the sentinel.
    pub fn value(self) -> Option<i64> {
        self.0
    }

    /// Whether this is the not-a-number sentinel.
    pub fn is_nan(self) -> bool {
        self.0.is_none()
    }

    /// Parse a token the way the instrument tables need: optional leading
    /// whitespace and sign, then the longest run of ASCII digits. Anything
    /// without at least one digit in that position, or a run that does not
    /// fit an `i64`, is [`Reading::NAN`].
    pub fn parse(token: &str) -> Self {
        let s = token.trim_start();
        let sign = usize::from(matches!(s.as_bytes().first(), Some(b'-' | b'+')));
        let end = s[sign..]
            .bytes()
            .position(|b| !b.is_ascii_digit())
            .map_or(s.len(), |pos| sign + pos);
        if end == sign {
            return Self::NAN;
        }

        s[..end].parse().map_or(Self::NAN, Self::new)
    }
}

impl From<i64> for Reading {
    fn from(value: i64) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{v}"),
            None => f.write_str("NaN"),
        }
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Reading {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Some(v) => serializer.serialize_i64(v),
            None => serializer.serialize_f64(f64::NAN),
        }
    }
}

/// One labeled measurement on an indexed channel.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CalibrationPoint {
    /// Position among the response lines that contributed to the table.
    pub index: usize,
    /// White-point group, `None` for black-point entries.
    pub group: Option<Group>,
    /// Measurement label (e.g. `R`).
    pub label: String,
    /// Measured value.
    pub value: Reading,
}

impl CalibrationPoint {
    /// Export key: `<index>.<label>` or `<index>.<group>.<label>`.
    pub fn key(&self) -> String {
        match self.group {
            Some(group) => format!("{}.{}.{}", self.index, group, self.label),
            None => format!("{}.{}", self.index, self.label),
        }
    }
}

/// Ordered calibration table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct CalibrationMap {
    points: Vec<CalibrationPoint>,
}

impl CalibrationMap {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a point.
    pub fn push(&mut self, point: CalibrationPoint) {
        self.points.push(point);
    }

    /// Points in decode order, duplicates included.
    pub fn points(&self) -> &[CalibrationPoint] {
        &self.points
    }

    /// Number of raw points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether no points were decoded.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Value for a point; when a key was reported twice the later one wins.
    pub fn get(&self, index: usize, group: Option<Group>, label: &str) -> Option<Reading> {
        self.points
            .iter()
            .rev()
            .find(|p| p.index == index && p.group == group && p.label == label)
            .map(|p| p.value)
    }

    /// Value by export key.
    pub fn get_key(&self, key: &str) -> Option<Reading> {
        self.points
            .iter()
            .rev()
            .find(|p| p.key() == key)
            .map(|p| p.value)
    }

    /// `(key, value)` pairs, one per distinct key, ordered by first
    /// appearance with the last reported value.
    pub fn entries(&self) -> Vec<(String, Reading)> {
        let mut entries: Vec<(String, Reading)> = Vec::with_capacity(self.points.len());
        let mut positions: BTreeMap<String, usize> = BTreeMap::new();

        for point in &self.points {
            let key = point.key();
            if let Some(&pos) = positions.get(&key) {
                entries[pos].1 = point.value;
            } else {
                positions.insert(key.clone(), entries.len());
                entries.push((key, point.value));
            }
        }

        entries
    }

    /// Keyed view for lookups.
    pub fn to_keyed(&self) -> BTreeMap<String, Reading> {
        self.entries().into_iter().collect()
    }
}

impl Extend<CalibrationPoint> for CalibrationMap {
    fn extend<T: IntoIterator<Item = CalibrationPoint>>(&mut self, iter: T) {
        self.points.extend(iter);
    }
}

impl FromIterator<CalibrationPoint> for CalibrationMap {
    fn from_iter<T: IntoIterator<Item = CalibrationPoint>>(iter: T) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

/// Everything collected from one instrument in a completed session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DeviceInfo {
    /// Instrument serial number.
    pub serial: String,
    /// Firmware version.
    pub firmware: String,
    /// Black-point table.
    pub black_point: CalibrationMap,
    /// White-point table.
    pub white_point: CalibrationMap,
}
