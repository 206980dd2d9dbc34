//! Decoders for the instrument's text responses.
//!
//! Every decoder returns `None` when it is handed no lines at all. That is
//! not an error: the caller treats it as an incomplete response and sends
//! the command again. Numeric tokens that fail to parse become
//! [`Reading::NAN`] instead of aborting the decode.

use log::warn;

use crate::calibration::{CalibrationMap, CalibrationPoint, Group, Reading};

/// Length of the serial number field.
const SERIAL_LEN: usize = 12;

/// Characters between the first `:` and the start of a field value (`": "`).
const FIELD_OFFSET: usize = 2;

/// Chars of `line` starting `FIELD_OFFSET` past the first `:`.
///
/// Without a `:` the value is taken from the second character on, matching
/// how the instrument tooling has always read malformed lines.
fn field_value(line: &str) -> impl Iterator<Item = char> + '_ {
    let skip = line
        .chars()
        .position(|c| c == ':')
        .map_or(1, |pos| pos + FIELD_OFFSET);
    line.chars().skip(skip)
}

/// Serial number from a `SER` response.
///
/// `"INFO: AB12CD34EF56 :X"` decodes to `"AB12CD34EF56"`.
pub fn decode_serial<S: AsRef<str>>(lines: &[S]) -> Option<String> {
    let first = lines.first()?.as_ref();
    let serial: String = field_value(first)
        .take(SERIAL_LEN)
        .collect();
    Some(serial.trim().to_string())
}

/// Firmware version from a `VER` response.
///
/// Everything after the first `:` (the whole line if there is none) is split
/// on `-` and the second segment is the version, so `"VER: REL-1.2.3"`
/// decodes to `"1.2.3"`. A value with no `-` decodes to an empty string.
pub fn decode_firmware<S: AsRef<str>>(lines: &[S]) -> Option<String> {
    let first = lines.first()?.as_ref();
    let value = first.split_once(':').map_or(first, |(_, rest)| rest);

    match value.split('-').nth(1) {
        Some(version) => Some(version.to_string()),
        None => {
            warn!("Firmware line has no version segment: {first:?}");
            Some(String::new())
        },
    }
}

/// Black-point table from a `CHECKBLACKPOINT` response.
///
/// Each line is a comma separated list of `label:value` pairs; line `i`
/// produces points with index `i`.
pub fn decode_black_point<S: AsRef<str>>(lines: &[S]) -> Option<CalibrationMap> {
    if lines.is_empty() {
        return None;
    }

    Some(
        lines
            .iter()
            .enumerate()
            .flat_map(|(index, line)| parse_line(index, None, line.as_ref()))
            .collect(),
    )
}

/// White-point table from a `CHECKWHITEPOINT` response.
///
/// Lines mentioning `MAIN` and lines mentioning `AUX` are indexed separately,
/// each by position within its own subsequence. A line containing both tags
/// contributes to both groups.
pub fn decode_white_point<S: AsRef<str>>(lines: &[S]) -> Option<CalibrationMap> {
    if lines.is_empty() {
        return None;
    }

    let mut map = CalibrationMap::new();
    for group in [Group::Main, Group::Aux] {
        map.extend(
            lines
                .iter()
                .map(|line| line.as_ref())
                .filter(|line: &&str| line.contains(group.tag()))
                .enumerate()
                .flat_map(|(index, line)| parse_line(index, Some(group), line)),
        );
    }
    Some(map)
}

/// Split one table line into points.
fn parse_line(
    index: usize,
    group: Option<Group>,
    line: &str,
) -> impl Iterator<Item = CalibrationPoint> + '_ {
    line.split(',').map(move |piece| {
        let (label, value) = match piece.split_once(':') {
            Some((label, value)) => (label, Reading::parse(value.trim())),
            None => (piece, Reading::NAN),
        };

        let mut label = label.trim();
        if let Some(group) = group {
            label = label
                .strip_prefix(group.tag())
                .map_or(label, str::trim_start);
        }

        CalibrationPoint {
            index,
            group,
            label: label.to_string(),
            value,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_LINES: [&str; 0] = [];

    #[test]
    fn test_decode_serial() {
        assert_eq!(
            decode_serial(&["INFO: AB12CD34EF56 :X"]),
            Some("AB12CD34EF56".to_string())
        );
    }

    #[test]
    fn test_decode_serial_short_value_is_trimmed() {
        assert_eq!(decode_serial(&["SN: 1234 "]), Some("1234".to_string()));
    }

    #[test]
    fn test_decode_serial_uses_first_line_only() {
        assert_eq!(
            decode_serial(&["SN: AAAAAAAAAAAA", "SN: BBBBBBBBBBBB"]),
            Some("AAAAAAAAAAAA".to_string())
        );
    }

    #[test]
    fn test_decode_serial_without_colon() {
        assert_eq!(
            decode_serial(&["XAB12CD34EF56ZZ"]),
            Some("AB12CD34EF56".to_string())
        );
    }

    #[test]
    fn test_decode_serial_no_lines_is_incomplete() {
        assert_eq!(decode_serial(&NO_LINES), None);
    }

    #[test]
    fn test_decode_firmware() {
        assert_eq!(
            decode_firmware(&["VER: REL-1.2.3"]),
            Some("1.2.3".to_string())
        );
    }

    #[test]
    fn test_decode_firmware_takes_second_segment_only() {
        assert_eq!(
            decode_firmware(&["VER: REL-2.0.1-rc1"]),
            Some("2.0.1".to_string())
        );
    }

    #[test]
    fn test_decode_firmware_missing_segment() {
        assert_eq!(decode_firmware(&["VER: 1.2.3"]), Some(String::new()));
        assert_eq!(decode_firmware(&NO_LINES), None);
    }

    #[test]
    fn test_decode_firmware_splits_right_after_colon() {
        assert_eq!(
            decode_firmware(&["VER:-1.2.3-x"]),
            Some("1.2.3".to_string())
        );
        assert_eq!(decode_firmware(&["REL-4.5"]), Some("4.5".to_string()));
    }

    #[test]
    fn test_decode_black_point() {
        let map = decode_black_point(&["R:10,G:20,B:30", "R:11,G:21,B:31"]).unwrap();
        let keyed = map.to_keyed();

        let expected = [
            ("0.R", 10),
            ("0.G", 20),
            ("0.B", 30),
            ("1.R", 11),
            ("1.G", 21),
            ("1.B", 31),
        ];
        assert_eq!(keyed.len(), expected.len());
        for (key, value) in expected {
            assert_eq!(keyed.get(key), Some(&Reading::new(value)), "key {key}");
        }
        assert_eq!(map.get(1, None, "G"), Some(Reading::new(21)));
    }

    #[test]
    fn test_decode_black_point_trims_labels_and_values() {
        let map = decode_black_point(&[" R : 10 , G: 20"]).unwrap();
        assert_eq!(map.get_key("0.R"), Some(Reading::new(10)));
        assert_eq!(map.get_key("0.G"), Some(Reading::new(20)));
    }

    #[test]
    fn test_decode_black_point_malformed_values_are_nan() {
        let map = decode_black_point(&["R:abc,G,B:7"]).unwrap();
        assert!(map.get_key("0.R").unwrap().is_nan());
        assert!(map.get_key("0.G").unwrap().is_nan());
        assert_eq!(map.get_key("0.B"), Some(Reading::new(7)));
    }

    #[test]
    fn test_decode_black_point_no_lines_is_incomplete() {
        assert_eq!(decode_black_point(&NO_LINES), None);
    }

    #[test]
    fn test_decode_white_point() {
        let map = decode_white_point(&["MAIN R:1,G:2", "AUX R:3,G:4"]).unwrap();
        let keyed = map.to_keyed();

        let expected = [("0.MAIN.R", 1), ("0.MAIN.G", 2), ("0.AUX.R", 3), ("0.AUX.G", 4)];
        assert_eq!(keyed.len(), expected.len());
        for (key, value) in expected {
            assert_eq!(keyed.get(key), Some(&Reading::new(value)), "key {key}");
        }
    }

    #[test]
    fn test_decode_white_point_indexes_each_group_separately() {
        let map = decode_white_point(&[
            "MAIN R:1",
            "AUX R:2",
            "noise",
            "MAIN R:3",
            "AUX R:4",
        ])
        .unwrap();

        assert_eq!(map.get(0, Some(Group::Main), "R"), Some(Reading::new(1)));
        assert_eq!(map.get(1, Some(Group::Main), "R"), Some(Reading::new(3)));
        assert_eq!(map.get(0, Some(Group::Aux), "R"), Some(Reading::new(2)));
        assert_eq!(map.get(1, Some(Group::Aux), "R"), Some(Reading::new(4)));
        assert_eq!(map.len(), 4);
    }

    #[test]
    fn test_decode_white_point_main_entries_come_first() {
        let map = decode_white_point(&["AUX R:3", "MAIN R:1"]).unwrap();
        let keys: Vec<String> = map
            .entries()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, ["0.MAIN.R", "0.AUX.R"]);
    }

    #[test]
    fn test_decode_white_point_line_with_both_tags_feeds_both_groups() {
        let map = decode_white_point(&["MAIN/AUX X:5"]).unwrap();
        assert_eq!(map.get(0, Some(Group::Main), "/AUX X"), Some(Reading::new(5)));
        assert_eq!(map.get(0, Some(Group::Aux), "MAIN/AUX X"), Some(Reading::new(5)));
    }

    #[test]
    fn test_decode_white_point_without_tagged_lines_is_empty_not_incomplete() {
        let map = decode_white_point(&["R:1,G:2"]).unwrap();
        assert!(map.is_empty());
    }
}
