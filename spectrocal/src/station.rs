//! One acquisition at the bench: find the adapter, open the line,
//! interrogate the instrument, release the line.

use std::time::Duration;

use log::{debug, info};

use crate::calibration::DeviceInfo;
use crate::connection::Connection;
use crate::device::{DiscoveryConfig, PortWatcher};
use crate::error::Result;
use crate::port::{NativePort, NativePortLister, Port, PortLister, SerialConfig};
use crate::protocol::engine::{EngineConfig, ProtocolEngine};
use crate::session::{Session, SessionConfig, SessionEvent};

/// Progress of a whole acquisition.
#[derive(Debug)]
pub enum StationEvent<'a> {
    /// Polling for the adapter.
    Discovering,
    /// Opening this port.
    Opening(&'a str),
    /// Interrogation progress.
    Session(SessionEvent<'a>),
    /// The line was released.
    Closed(&'a str),
}

/// Acquisition workflow over a [`PortLister`].
#[derive(Debug, Clone)]
pub struct Station<L> {
    watcher: PortWatcher<L>,
    engine: EngineConfig,
    session: Session,
    port_override: Option<String>,
}

impl Station<NativePortLister> {
    /// Station over the OS port list with default timing.
    pub fn native() -> Self {
        Self::new(
            NativePortLister,
            DiscoveryConfig::default(),
            EngineConfig::default(),
            SessionConfig::default(),
        )
    }

    /// Acquire one instrument through a native serial port.
    pub fn acquire(&self) -> Result<DeviceInfo> {
        self.acquire_with_progress(&mut |_| {})
    }

    /// [`acquire`](Self::acquire) with progress notifications.
    pub fn acquire_with_progress(
        &self,
        on_event: &mut dyn FnMut(StationEvent<'_>),
    ) -> Result<DeviceInfo> {
        let ceiling = self.engine.ceiling;
        self.acquire_with(
            |name| Connection::<NativePort>::open(&SerialConfig::for_instrument(name), ceiling),
            on_event,
        )
    }
}

impl<L: PortLister> Station<L> {
    /// Create a station.
    pub fn new(
        lister: L,
        discovery: DiscoveryConfig,
        engine: EngineConfig,
        session: SessionConfig,
    ) -> Self {
        Self {
            watcher: PortWatcher::new(lister, discovery),
            engine,
            session: Session::new(session),
            port_override: None,
        }
    }

    /// Use `port` directly instead of polling for the adapter.
    #[must_use]
    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port_override = Some(port.into());
        self
    }

    /// Port discovery.
    pub fn watcher(&self) -> &PortWatcher<L> {
        &self.watcher
    }

    /// Engine timing.
    pub fn engine_config(&self) -> EngineConfig {
        self.engine
    }

    /// Command ceiling.
    pub fn ceiling(&self) -> Duration {
        self.engine.ceiling
    }

    /// Resolve the port to use: the override if set, else wait for the adapter.
    pub fn resolve_port(&self) -> Result<String> {
        match &self.port_override {
            Some(port) => {
                debug!("Using port {port} (discovery skipped)");
                Ok(port.clone())
            },
            None => Ok(self.watcher.wait_for_port()?.name),
        }
    }

    /// Acquire one instrument, opening the line with `open`.
    ///
    /// Open failures are returned to the caller. Once open, the line is
    /// closed on every exit path of the interrogation loop.
    pub fn acquire_with<P, F>(
        &self,
        open: F,
        on_event: &mut dyn FnMut(StationEvent<'_>),
    ) -> Result<DeviceInfo>
    where
        P: Port,
        F: FnOnce(&str) -> Result<Connection<P>>,
    {
        if self.port_override.is_none() {
            on_event(StationEvent::Discovering);
        }
        let port = self.resolve_port()?;

        on_event(StationEvent::Opening(&port));
        let connection = open(&port)?;

        let mut engine = ProtocolEngine::with_config(connection, self.engine);
        let result = self
            .session
            .run_with_progress(&mut engine, &mut |event| on_event(StationEvent::Session(event)));
        engine.close();
        on_event(StationEvent::Closed(&port));

        if let Ok(info) = &result {
            info!("Collected {} from {port}", info.serial);
        }
        result
    }
}
