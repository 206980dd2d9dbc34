//! Collection loop: one instrument after another into the run's CSV files.

use {
    super::acquire,
    crate::{
        Cli, CliError, CollectArgs, build_station,
        config::Config,
        export::{CsvExporter, default_export_dir},
        prompt::{self, NextAction},
        was_interrupted,
    },
    anyhow::Result,
    console::style,
    spectrocal::{DeviceInfo, Error},
};

/// Collect command implementation.
pub(crate) fn cmd_collect(cli: &Cli, config: &Config, args: &CollectArgs) -> Result<()> {
    prompt::ensure_interactive_terminal()?;

    let device = match args
        .device
        .clone()
        .or_else(|| config.station.device.clone())
    {
        Some(device) => device,
        None => prompt::ask_device(None)?,
    };
    prompt::validate_label("device", &device)?;

    let metric = match args
        .metric
        .clone()
        .or_else(|| config.station.metric.clone())
    {
        Some(metric) => metric,
        None => prompt::ask_metric(None)?,
    };
    prompt::validate_label("metric", &metric)?;

    let dir = args
        .output_dir
        .clone()
        .or_else(|| config.export.dir.clone())
        .unwrap_or_else(default_export_dir);
    let mut exporter = CsvExporter::new(dir, &device, &metric);

    let station = build_station(cli, config);
    let mut collected = 0usize;

    loop {
        eprintln!("{}", style("-".repeat(72)).dim());
        if prompt::wait_for_operator()? == NextAction::Quit || was_interrupted() {
            break;
        }

        match acquire(&station, cli.quiet) {
            Ok(info) => {
                if export(&mut exporter, &info) {
                    collected += 1;
                }
            },
            Err(Error::Interrupted) => {
                return Err(CliError::Cancelled("collection cancelled".to_string()).into());
            },
            Err(e) => {
                eprintln!("{} {e}", style("✗").red());
            },
        }
    }

    if !cli.quiet {
        eprintln!(
            "{} Collected {collected} instrument(s)",
            style("→").green().bold()
        );
    }
    Ok(())
}

/// Append `info` to the run's files and report the outcome.
///
/// A failed export is reported and the loop goes on with the next instrument.
fn export(exporter: &mut CsvExporter, info: &DeviceInfo) -> bool {
    match exporter.append(info) {
        Ok(paths) => {
            eprintln!("{} Appended results to file", style("✓").green());
            for path in paths {
                eprintln!("    {} {}", style("•").dim(), path.display());
            }
            true
        },
        Err(e) => {
            eprintln!("{} {} not exported: {e:#}", style("✗").red(), info.serial);
            false
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spectrocal::CalibrationMap;
    use std::fs;
    use tempfile::tempdir;

    fn instrument(serial: &str) -> DeviceInfo {
        DeviceInfo {
            serial: serial.to_string(),
            firmware: "1.2.3".to_string(),
            black_point: CalibrationMap::new(),
            white_point: CalibrationMap::new(),
        }
    }

    #[test]
    fn test_export_failure_is_not_fatal() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "").unwrap();

        let mut broken = CsvExporter::with_stamp(&blocker, "spectro-one", "passes", 1);
        assert!(!export(&mut broken, &instrument("AAAA")));

        let mut exporter = CsvExporter::with_stamp(dir.path(), "spectro-one", "passes", 1);
        assert!(export(&mut exporter, &instrument("BBBB")));
    }
}
