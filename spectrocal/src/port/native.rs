//! Native serial port backend using the `serialport` crate.

use {
    crate::{
        error::{Error, Result},
        port::{Port, PortInfo, PortLister, SerialConfig},
    },
    log::trace,
    std::{
        io::{Read, Write},
        time::Duration,
    },
};

/// Native serial port.
pub struct NativePort {
    port: Option<Box<dyn serialport::SerialPort>>,
    name: String,
    timeout: Duration,
}

impl NativePort {
    /// Open a serial port with the given configuration.
    ///
    /// Only opens the line; asserting DTR/RTS is left to the connection.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let port = serialport::new(&config.port_name, config.baud_rate)
            .timeout(config.read_timeout)
            .data_bits(config.data_bits)
            .parity(config.parity)
            .stop_bits(config.stop_bits)
            .flow_control(config.flow_control)
            .open()?;

        Ok(Self {
            port: Some(port),
            name: config.port_name.clone(),
            timeout: config.read_timeout,
        })
    }

    fn closed_error() -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::NotConnected, "port closed")
    }
}

impl Port for NativePort {
    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        if let Some(ref mut p) = self.port {
            p.set_timeout(timeout)?;
        }
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_dtr(&mut self, level: bool) -> Result<()> {
        trace!("Setting DTR to {level}");
        match self.port {
            Some(ref mut p) => Ok(p.write_data_terminal_ready(level)?),
            None => Err(Error::Transport("port closed".into())),
        }
    }

    fn set_rts(&mut self, level: bool) -> Result<()> {
        trace!("Setting RTS to {level}");
        match self.port {
            Some(ref mut p) => Ok(p.write_request_to_send(level)?),
            None => Err(Error::Transport("port closed".into())),
        }
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the handle closes the OS descriptor
        if self.port.take().is_some() {
            trace!("Closed {}", self.name);
        }
        Ok(())
    }
}

impl Read for NativePort {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.port
            .as_mut()
            .ok_or_else(Self::closed_error)
            .and_then(|p| p.read(buf))
    }
}

impl Write for NativePort {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.port
            .as_mut()
            .ok_or_else(Self::closed_error)
            .and_then(|p| p.write(buf))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.port
            .as_mut()
            .ok_or_else(Self::closed_error)
            .and_then(std::io::Write::flush)
    }
}

/// Lists ports through `serialport::available_ports`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativePortLister;

impl PortLister for NativePortLister {
    fn list_ports(&self) -> Result<Vec<PortInfo>> {
        let ports = serialport::available_ports().map_err(Error::Serial)?;

        Ok(ports
            .into_iter()
            .map(|p| match p.port_type {
                serialport::SerialPortType::UsbPort(info) => {
                    trace!(
                        "Found USB port: {} (VID: {:04X}, PID: {:04X})",
                        p.port_name, info.vid, info.pid
                    );
                    PortInfo {
                        name: p.port_name,
                        vid: Some(info.vid),
                        pid: Some(info.pid),
                        manufacturer: info.manufacturer,
                        product: info.product,
                        serial_number: info.serial_number,
                    }
                },
                _ => PortInfo::named(p.port_name),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_ports() {
        // Only verifies enumeration doesn't panic on hosts without ports
        let _ = NativePortLister.list_ports();
    }

    #[test]
    fn test_open_missing_port_is_transport_error() {
        let config = SerialConfig::for_instrument("/dev/spectrocal-does-not-exist");
        match NativePort::open(&config) {
            Err(e) => assert!(e.is_transport()),
            Ok(_) => panic!("opening a nonexistent port should fail"),
        }
    }
}
