//! CSV export of collected instruments.
//!
//! A collection run writes two files into the export directory, one per
//! calibration table:
//!
//! ```text
//! <device>.<metric>.blackpoint.<epoch-ms>.csv
//! <device>.<metric>.whitepoint.<epoch-ms>.csv
//! ```
//!
//! Each row is one instrument. Columns are the table's keys in decode order
//! followed by `serial` and `firmware`. The header is written when the file
//! is created. A later instrument with columns the header lacks widens it:
//! the file is rewritten with the new columns and earlier rows padded empty.

use anyhow::{Context, Result};
use directories::UserDirs;
use log::{debug, info};
use spectrocal::{CalibrationMap, DeviceInfo};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Default export directory: the user's Documents folder, else the current directory.
pub fn default_export_dir() -> PathBuf {
    UserDirs::new()
        .and_then(|dirs| dirs.document_dir().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Milliseconds since the Unix epoch.
pub fn epoch_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

/// Calibration table exported to its own file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    /// Black-point readings.
    BlackPoint,
    /// White-point readings.
    WhitePoint,
}

impl Table {
    /// Both tables, in export order.
    pub const ALL: [Self; 2] = [Self::BlackPoint, Self::WhitePoint];

    /// File name component.
    pub fn name(self) -> &'static str {
        match self {
            Self::BlackPoint => "blackpoint",
            Self::WhitePoint => "whitepoint",
        }
    }

    fn of(self, info: &DeviceInfo) -> &CalibrationMap {
        match self {
            Self::BlackPoint => &info.black_point,
            Self::WhitePoint => &info.white_point,
        }
    }

    fn slot(self) -> usize {
        match self {
            Self::BlackPoint => 0,
            Self::WhitePoint => 1,
        }
    }
}

/// Appends instruments to the run's CSV files.
#[derive(Debug)]
pub struct CsvExporter {
    dir: PathBuf,
    device: String,
    metric: String,
    stamp: u128,
    headers: [Option<Vec<String>>; 2],
}

impl CsvExporter {
    /// Exporter for one run, stamped with the current time.
    pub fn new(dir: impl Into<PathBuf>, device: &str, metric: &str) -> Self {
        Self::with_stamp(dir, device, metric, epoch_millis())
    }

    /// Exporter with an explicit file stamp.
    pub fn with_stamp(dir: impl Into<PathBuf>, device: &str, metric: &str, stamp: u128) -> Self {
        Self {
            dir: dir.into(),
            device: device.to_string(),
            metric: metric.to_string(),
            stamp,
            headers: [None, None],
        }
    }

    /// Path of a table's file.
    pub fn path(&self, table: Table) -> PathBuf {
        self.dir.join(format!(
            "{}.{}.{}.{}.csv",
            self.device,
            self.metric,
            table.name(),
            self.stamp
        ))
    }

    /// Append `info` to both tables, returning the files written.
    pub fn append(&mut self, info: &DeviceInfo) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create export directory {}", self.dir.display()))?;

        Table::ALL
            .into_iter()
            .map(|table| self.append_table(table, info))
            .collect()
    }

    fn append_table(&mut self, table: Table, info: &DeviceInfo) -> Result<PathBuf> {
        let path = self.path(table);
        let row = row(table.of(info), info);

        let is_new = fs::metadata(&path).map_or(true, |m| m.len() == 0);
        let current = match &self.headers[table.slot()] {
            Some(header) => header.clone(),
            None if is_new => Vec::new(),
            None => read_header(&path)?,
        };

        let header = widen(&current, &row);
        if !is_new && header != current {
            rewrite(&path, &current, &header)?;
            info!(
                "{}: header widened to {} columns",
                path.display(),
                header.len()
            );
        }

        let record: Vec<String> = header
            .iter()
            .map(|column| {
                row.iter()
                    .find(|(key, _)| key == column)
                    .map(|(_, value)| value.clone())
                    .unwrap_or_default()
            })
            .collect();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if is_new {
            writer
                .write_record(&header)
                .context("Failed to write CSV header")?;
        }
        writer
            .write_record(&record)
            .with_context(|| format!("Failed to write row to {}", path.display()))?;
        writer
            .flush()
            .context("Failed to flush CSV writer")?;

        debug!("Appended {} to {}", info.serial, path.display());
        self.headers[table.slot()] = Some(header);
        Ok(path)
    }
}

/// `(column, value)` pairs for one instrument.
fn row(map: &CalibrationMap, info: &DeviceInfo) -> Vec<(String, String)> {
    map.entries()
        .into_iter()
        .map(|(key, value)| (key, value.to_string()))
        .chain([
            ("serial".to_string(), info.serial.clone()),
            ("firmware".to_string(), info.firmware.clone()),
        ])
        .collect()
}

/// Columns that are not calibration keys, kept at the end of every header.
const TRAILING: [&str; 2] = ["serial", "firmware"];

/// `header` extended with the row's missing calibration keys, in row order,
/// ahead of the trailing columns.
fn widen(header: &[String], row: &[(String, String)]) -> Vec<String> {
    if row.iter().all(|(key, _)| header.contains(key)) {
        return header.to_vec();
    }

    let mut widened: Vec<String> = header
        .iter()
        .filter(|column| !is_trailing(column))
        .cloned()
        .collect();
    for (key, _) in row {
        if !is_trailing(key) && !widened.contains(key) {
            widened.push(key.clone());
        }
    }
    widened.extend(TRAILING.iter().map(|column| (*column).to_string()));
    widened
}

fn is_trailing(column: &str) -> bool {
    TRAILING.contains(&column)
}

/// Rewrite `path` under `header`, moving each existing value to its column.
fn rewrite(path: &Path, old: &[String], header: &[String]) -> Result<()> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let positions: Vec<Option<usize>> = header
        .iter()
        .map(|column| old.iter().position(|c| c == column))
        .collect();

    let staging = path.with_extension("csv.tmp");
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(&staging)
        .with_context(|| format!("Failed to create {}", staging.display()))?;
    writer
        .write_record(header)
        .context("Failed to write CSV header")?;

    for record in reader.records() {
        let record = record.with_context(|| format!("Failed to read row of {}", path.display()))?;
        let moved: Vec<&str> = positions
            .iter()
            .map(|pos| pos.and_then(|i| record.get(i)).unwrap_or(""))
            .collect();
        writer
            .write_record(&moved)
            .with_context(|| format!("Failed to write {}", staging.display()))?;
    }
    writer
        .flush()
        .context("Failed to flush CSV writer")?;
    drop(writer);

    fs::rename(&staging, path)
        .with_context(|| format!("Failed to replace {}", path.display()))
}

fn read_header(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let header = reader
        .headers()
        .with_context(|| format!("Failed to read header of {}", path.display()))?;
    Ok(header.iter().map(str::to_string).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectrocal::{CalibrationPoint, Group, Reading};
    use tempfile::tempdir;

    fn point(index: usize, group: Option<Group>, label: &str, value: Reading) -> CalibrationPoint {
        CalibrationPoint {
            index,
            group,
            label: label.to_string(),
            value,
        }
    }

    fn instrument(serial: &str, red: Reading) -> DeviceInfo {
        DeviceInfo {
            serial: serial.to_string(),
            firmware: "1.2.3".to_string(),
            black_point: [
                point(0, None, "R", red),
                point(0, None, "G", Reading::new(20)),
            ]
            .into_iter()
            .collect(),
            white_point: [
                point(0, Some(Group::Main), "R", Reading::new(1)),
                point(0, Some(Group::Aux), "R", Reading::new(3)),
            ]
            .into_iter()
            .collect(),
        }
    }

    #[test]
    fn test_file_names() {
        let exporter = CsvExporter::with_stamp("/data", "spectro-one", "passes", 1700000000123);
        assert_eq!(
            exporter.path(Table::BlackPoint),
            PathBuf::from("/data/spectro-one.passes.blackpoint.1700000000123.csv")
        );
        assert_eq!(
            exporter.path(Table::WhitePoint),
            PathBuf::from("/data/spectro-one.passes.whitepoint.1700000000123.csv")
        );
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempdir().unwrap();
        let mut exporter = CsvExporter::with_stamp(dir.path(), "spectro-one", "fails", 1);

        exporter.append(&instrument("AAAA", Reading::new(10))).unwrap();
        let written = exporter.append(&instrument("BBBB", Reading::new(11))).unwrap();
        assert_eq!(written.len(), 2);

        let black = fs::read_to_string(exporter.path(Table::BlackPoint)).unwrap();
        assert_eq!(
            black,
            "0.R,0.G,serial,firmware\n10,20,AAAA,1.2.3\n11,20,BBBB,1.2.3\n"
        );

        let white = fs::read_to_string(exporter.path(Table::WhitePoint)).unwrap();
        assert_eq!(
            white,
            "0.MAIN.R,0.AUX.R,serial,firmware\n1,3,AAAA,1.2.3\n1,3,BBBB,1.2.3\n"
        );
    }

    #[test]
    fn test_nan_is_written_as_nan() {
        let dir = tempdir().unwrap();
        let mut exporter = CsvExporter::with_stamp(dir.path(), "spectro-one", "passes", 2);

        exporter.append(&instrument("AAAA", Reading::NAN)).unwrap();
        let black = fs::read_to_string(exporter.path(Table::BlackPoint)).unwrap();
        assert!(black.ends_with("NaN,20,AAAA,1.2.3\n"), "{black}");
    }

    #[test]
    fn test_rows_align_to_existing_header() {
        let dir = tempdir().unwrap();
        let mut first = CsvExporter::with_stamp(dir.path(), "spectro-one", "passes", 3);
        first.append(&instrument("AAAA", Reading::new(10))).unwrap();

        // A later run with the same stamp picks the header up from disk.
        let mut second = CsvExporter::with_stamp(dir.path(), "spectro-one", "passes", 3);
        let mut info = instrument("BBBB", Reading::new(12));
        info.black_point = [point(0, None, "G", Reading::new(21))]
            .into_iter()
            .collect();
        second.append(&info).unwrap();

        let black = fs::read_to_string(second.path(Table::BlackPoint)).unwrap();
        assert_eq!(
            black,
            "0.R,0.G,serial,firmware\n10,20,AAAA,1.2.3\n,21,BBBB,1.2.3\n"
        );
    }

    #[test]
    fn test_wider_instrument_widens_the_header() {
        let dir = tempdir().unwrap();
        let mut exporter = CsvExporter::with_stamp(dir.path(), "spectro-one", "passes", 5);

        let mut narrow = instrument("AAAA", Reading::new(100));
        narrow.black_point = [point(0, None, "R", Reading::new(100))]
            .into_iter()
            .collect();
        exporter.append(&narrow).unwrap();

        let mut wide = instrument("BBBB", Reading::new(100));
        wide.black_point = [
            point(0, None, "R", Reading::new(100)),
            point(1, None, "R", Reading::new(101)),
            point(2, None, "R", Reading::new(102)),
        ]
        .into_iter()
        .collect();
        exporter.append(&wide).unwrap();
        exporter.append(&narrow).unwrap();

        let black = fs::read_to_string(exporter.path(Table::BlackPoint)).unwrap();
        assert_eq!(
            black,
            "0.R,1.R,2.R,serial,firmware\n\
             100,,,AAAA,1.2.3\n\
             100,101,102,BBBB,1.2.3\n\
             100,,,AAAA,1.2.3\n"
        );
        assert!(!dir.path().join("spectro-one.passes.blackpoint.5.csv.tmp").exists());
    }

    #[test]
    fn test_widen_keeps_trailing_columns_last() {
        let header: Vec<String> = ["0.R", "serial", "firmware"].map(String::from).to_vec();
        let row = vec![
            ("0.G".to_string(), "1".to_string()),
            ("serial".to_string(), "A".to_string()),
            ("firmware".to_string(), "1".to_string()),
        ];
        assert_eq!(widen(&header, &row), ["0.R", "0.G", "serial", "firmware"]);
        assert_eq!(widen(&header, &row[1..]), header);
    }

    #[test]
    fn test_export_dir_is_created() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let mut exporter = CsvExporter::with_stamp(&nested, "spectro-one-pro", "passes", 4);

        exporter.append(&instrument("AAAA", Reading::new(1))).unwrap();
        assert!(exporter.path(Table::WhitePoint).exists());
    }
}
