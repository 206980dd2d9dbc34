//! Connection lifecycle and per-call data subscriptions.
//!
//! A [`Connection`] owns exactly one open line. Received bytes are delivered
//! to whoever holds the current [`Subscription`]; since subscribing borrows the
//! connection mutably, there is never more than one observer and never more
//! than one command in flight.

use std::io::{ErrorKind, Read};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, trace};

use crate::error::{Error, Result};
use crate::port::{NativePort, Port, SerialConfig};

/// Upper bound on every open and every send/response cycle.
pub const CEILING_TIMEOUT: Duration = Duration::from_secs(3);

/// Longest single blocking read while pumping a subscription.
const READ_SLICE: Duration = Duration::from_millis(20);

/// An open serial line with DTR and RTS asserted.
pub struct Connection<P: Port> {
    port: P,
    open: bool,
}

impl Connection<NativePort> {
    /// Open the line described by `config`, failing with [`Error::Timeout`]
    /// if that takes longer than `ceiling`.
    pub fn open(config: &SerialConfig, ceiling: Duration) -> Result<Self> {
        let config = config.clone();
        let name = config.port_name.clone();
        Self::open_with(&name, move || NativePort::open(&config), ceiling)
    }
}

impl<P: Port + 'static> Connection<P> {
    /// Open a line using `opener`, bounded by `ceiling`.
    ///
    /// The opener runs on a worker thread. If the ceiling fires first the
    /// worker is abandoned and whatever port it eventually produces is dropped.
    pub fn open_with<F>(name: &str, opener: F, ceiling: Duration) -> Result<Self>
    where
        F: FnOnce() -> Result<P> + Send + 'static,
    {
        debug!("Opening {name}");
        let (tx, rx) = mpsc::channel();

        thread::Builder::new()
            .name("spectrocal-open".into())
            .spawn(move || {
                let result = opener().and_then(Self::from_port);
                let _ = tx.send(result);
            })?;

        match rx.recv_timeout(ceiling) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(Error::Timeout(format!(
                "opening {name} took longer than {} ms",
                ceiling.as_millis()
            ))),
            Err(RecvTimeoutError::Disconnected) => {
                Err(Error::Transport(format!("open worker for {name} exited")))
            },
        }
    }
}

impl<P: Port> Connection<P> {
    /// Wrap an already opened port, asserting DTR and RTS.
    pub fn from_port(mut port: P) -> Result<Self> {
        port.set_dtr(true)?;
        port.set_rts(true)?;
        debug!("{} open, DTR/RTS asserted", port.name());
        Ok(Self { port, open: true })
    }

    /// Name of the underlying port.
    pub fn name(&self) -> &str {
        self.port.name()
    }

    /// Whether [`close`](Self::close) has not been called yet.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Attach `on_data` as the sole receiver of incoming bytes.
    ///
    /// The observer is detached when the returned subscription is dropped,
    /// on success and error paths alike.
    pub fn subscribe<F>(&mut self, on_data: F) -> Result<Subscription<'_, P, F>>
    where
        F: FnMut(&[u8]),
    {
        if !self.open {
            return Err(Error::Transport(format!("{} is closed", self.port.name())));
        }
        trace!("Observer attached to {}", self.port.name());
        Ok(Subscription {
            port: &mut self.port,
            on_data,
        })
    }

    /// Release the line. Errors are logged and swallowed; repeated calls are no-ops.
    pub fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        if let Err(e) = self.port.close() {
            debug!("Ignoring error while closing {}: {e}", self.port.name());
        } else {
            debug!("Closed {}", self.port.name());
        }
    }

    #[cfg(test)]
    pub(crate) fn port(&self) -> &P {
        &self.port
    }
}

impl<P: Port> Drop for Connection<P> {
    fn drop(&mut self) {
        self.close();
    }
}

/// The single active data observer on a [`Connection`].
pub struct Subscription<'a, P: Port, F: FnMut(&[u8])> {
    port: &'a mut P,
    on_data: F,
}

impl<P: Port, F: FnMut(&[u8])> Subscription<'_, P, F> {
    /// Write `bytes` to the line.
    pub fn transmit(&mut self, bytes: &[u8]) -> Result<()> {
        trace!("TX {:?}", String::from_utf8_lossy(bytes));
        self.port.write_all_bytes(bytes)
    }

    /// Feed received bytes to the observer until `deadline`.
    pub fn pump_until(&mut self, deadline: Instant) -> Result<()> {
        let mut buf = [0u8; 256];

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            self.port.set_timeout((deadline - now).min(READ_SLICE))?;

            match self.port.read(&mut buf) {
                Ok(0) => {},
                Ok(n) => {
                    trace!("RX {:?}", String::from_utf8_lossy(&buf[..n]));
                    (self.on_data)(&buf[..n]);
                },
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) => {},
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }
}

impl<P: Port, F: FnMut(&[u8])> Drop for Subscription<'_, P, F> {
    fn drop(&mut self) {
        trace!("Observer detached from {}", self.port.name());
    }
}
