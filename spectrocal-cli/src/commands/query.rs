//! One-shot instrument access: full interrogation or a single raw command.

use {
    super::acquire,
    crate::{Cli, CliError, build_station, config::Config},
    anyhow::{Context, Result},
    console::style,
    log::debug,
    spectrocal::{
        CalibrationMap, Command, Connection, DeviceInfo, ProtocolEngine, SerialConfig, protocol,
    },
    std::time::Duration,
};

/// Window used for tokens outside the instrument's command set.
const RAW_WINDOW: Duration = Duration::from_millis(500);

/// Query command implementation.
pub(crate) fn cmd_query(cli: &Cli, config: &Config, json: bool) -> Result<()> {
    let station = build_station(cli, config);
    let info = acquire(&station, cli.quiet || json).context("Failed to query instrument")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        print!("{}", format_device_info(&info));
    }
    Ok(())
}

/// Human-readable rendering of a collected instrument.
fn format_device_info(info: &DeviceInfo) -> String {
    let mut out = format!("serial: {}\nfirmware: {}\n", info.serial, info.firmware);
    for (title, map) in [("black point", &info.black_point), ("white point", &info.white_point)] {
        out.push_str(&format!("{title}:\n"));
        out.push_str(&format_map(map));
    }
    out
}

fn format_map(map: &CalibrationMap) -> String {
    if map.is_empty() {
        return "  (none)\n".to_string();
    }
    map.entries()
        .into_iter()
        .map(|(key, value)| format!("  {key} = {value}\n"))
        .collect()
}

/// Resolve the collection window for a raw token.
fn window_for(token: &str, window_ms: Option<u64>) -> Duration {
    window_ms.map_or_else(
        || Command::from_token(token).map_or(RAW_WINDOW, Command::default_window),
        Duration::from_millis,
    )
}

/// Send command implementation.
pub(crate) fn cmd_send(
    cli: &Cli,
    config: &Config,
    token: &str,
    window_ms: Option<u64>,
) -> Result<()> {
    protocol::frame(token).map_err(|e| CliError::Usage(e.to_string()))?;

    let station = build_station(cli, config);
    let window = window_for(token, window_ms);
    let port = station.resolve_port()?;

    if !cli.quiet {
        eprintln!(
            "{} {} -> {token} (window {} ms)",
            style("🔌").cyan(),
            port,
            window.as_millis()
        );
    }

    let connection = Connection::open(&SerialConfig::for_instrument(&port), station.ceiling())
        .with_context(|| format!("Failed to open {port}"))?;
    let mut engine = ProtocolEngine::with_config(connection, station.engine_config());
    let result = engine.send(token, window);
    engine.close();

    let lines = result.with_context(|| format!("{token} failed"))?;
    debug!("{token}: {} line(s)", lines.len());
    for line in lines {
        println!("{line}");
    }
    Ok(())
}
