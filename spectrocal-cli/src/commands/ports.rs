//! Port listing command implementation.

use {
    crate::config::Config,
    anyhow::Result,
    console::style,
    log::debug,
    spectrocal::{
        DiscoveryConfig, NativePortLister, PortInfo, PortLister, PortSelection, UsbId,
        format_port_list, select_port,
    },
};

/// List ports command implementation.
pub(crate) fn cmd_list_ports(config: &Config, json: bool, all: bool) -> Result<()> {
    let usb = config.usb_id();
    let ports = NativePortLister
        .list_ports()
        .unwrap_or_else(|e| {
            debug!("Failed to enumerate serial ports: {e}");
            Vec::new()
        });
    let shown = visible_ports(&ports, usb, all);

    if json {
        let entries: Vec<serde_json::Value> = shown
            .iter()
            .map(|p| port_json(p, usb))
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    let header = if all { "Serial ports" } else { "Instrument adapters" };
    eprintln!("{}", style(header).bold().underlined());

    if shown.is_empty() {
        eprintln!("  {}", style("No ports found").dim());
    } else {
        for line in format_port_list(&shown, usb) {
            eprintln!("  {} {}", style("•").green(), line);
        }
    }

    match select_port(ports, usb, DiscoveryConfig::default().max_matches) {
        PortSelection::Selected(port) => eprintln!(
            "\n{} Would use {}",
            style("→").green().bold(),
            style(&port.name).cyan().bold()
        ),
        PortSelection::TooMany(n) => eprintln!(
            "\n{} Found too many UART adapter boards ({n})",
            style("⚠").yellow()
        ),
        PortSelection::NoMatch => eprintln!(
            "\n{} No UART adapter board found ({usb})",
            style("⚠").yellow()
        ),
    }
    Ok(())
}

/// Ports to display: adapters only unless `all` is set.
fn visible_ports(ports: &[PortInfo], usb: UsbId, all: bool) -> Vec<PortInfo> {
    ports
        .iter()
        .filter(|p| all || usb.matches(p))
        .cloned()
        .collect()
}

fn port_json(port: &PortInfo, usb: UsbId) -> serde_json::Value {
    serde_json::json!({
        "name": port.name,
        "adapter": usb.matches(port),
        "vid": port.vid,
        "pid": port.pid,
        "manufacturer": port.manufacturer,
        "product": port.product,
        "serial": port.serial_number,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ports() -> Vec<PortInfo> {
        vec![
            PortInfo::named("/dev/ttyS0"),
            PortInfo::named("/dev/ttyUSB0").with_usb(0x10C4, 0xEA60),
        ]
    }

    #[test]
    fn test_visible_ports_filters_adapters() {
        let shown = visible_ports(&ports(), UsbId::INSTRUMENT_ADAPTER, false);
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].name, "/dev/ttyUSB0");

        assert_eq!(visible_ports(&ports(), UsbId::INSTRUMENT_ADAPTER, true).len(), 2);
    }

    #[test]
    fn test_port_json() {
        let value = port_json(&ports()[1], UsbId::INSTRUMENT_ADAPTER);
        assert_eq!(value["name"], "/dev/ttyUSB0");
        assert_eq!(value["adapter"], true);
        assert_eq!(value["vid"], 0x10C4);

        let value = port_json(&ports()[0], UsbId::INSTRUMENT_ADAPTER);
        assert_eq!(value["adapter"], false);
        assert!(value["vid"].is_null());
    }
}
