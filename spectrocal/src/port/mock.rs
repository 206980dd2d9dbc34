//! Scripted in-memory port for driving the engine and session in tests.

use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::port::Port;

/// What the instrument does after receiving one command line.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    /// Bytes become readable right after the command is written.
    Bytes(Vec<u8>),
    /// The write itself fails.
    WriteError,
}

impl Reply {
    pub(crate) fn lines(lines: &[&str]) -> Self {
        let mut bytes = Vec::new();
        for line in lines {
            bytes.extend_from_slice(line.as_bytes());
            bytes.extend_from_slice(b"\r\n");
        }
        Self::Bytes(bytes)
    }

    pub(crate) fn silent() -> Self {
        Self::Bytes(Vec::new())
    }
}

#[derive(Debug, Default)]
pub(crate) struct MockState {
    script: HashMap<String, VecDeque<Reply>>,
    fallback: HashMap<String, Reply>,
    pending_write: Vec<u8>,
    readable: VecDeque<u8>,
    pub(crate) written: Vec<String>,
    pub(crate) dtr: bool,
    pub(crate) rts: bool,
    pub(crate) close_calls: usize,
}

/// Cloneable view of the port's state that survives moving the port into an engine.
#[derive(Debug, Clone, Default)]
pub(crate) struct MockHandle(Arc<Mutex<MockState>>);

impl MockHandle {
    pub(crate) fn state(&self) -> MutexGuard<'_, MockState> {
        self.0.lock().unwrap()
    }

    /// Queue a one-shot reply for the next occurrence of `command`.
    pub(crate) fn push(&self, command: &str, reply: Reply) -> &Self {
        self.state()
            .script
            .entry(command.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    /// Reply used for `command` once its queue is exhausted.
    pub(crate) fn always(&self, command: &str, reply: Reply) -> &Self {
        self.state().fallback.insert(command.to_string(), reply);
        self
    }

    /// Push raw bytes as if the instrument sent them unprompted.
    pub(crate) fn inject(&self, bytes: &[u8]) {
        self.state().readable.extend(bytes.iter().copied());
    }

    pub(crate) fn written(&self) -> Vec<String> {
        self.state().written.clone()
    }
}

pub(crate) struct MockPort {
    handle: MockHandle,
    timeout: Duration,
    closed: bool,
}

impl MockPort {
    pub(crate) fn new() -> (Self, MockHandle) {
        let handle = MockHandle::default();
        let port = Self {
            handle: handle.clone(),
            timeout: Duration::from_millis(2),
            closed: false,
        };
        (port, handle)
    }
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "port closed"));
        }
        let mut state = self.handle.state();
        if state.readable.is_empty() {
            drop(state);
            thread::sleep(self.timeout.min(Duration::from_millis(2)));
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        let n = buf.len().min(state.readable.len());
        for b in buf.iter_mut().take(n) {
            *b = state.readable.pop_front().unwrap();
        }
        Ok(n)
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "port closed"));
        }
        let mut state = self.handle.state();
        state.pending_write.extend_from_slice(buf);

        while let Some(pos) = state
            .pending_write
            .windows(2)
            .position(|w| w == b"\r\n")
        {
            let line: Vec<u8> = state.pending_write.drain(..pos + 2).collect();
            let command = String::from_utf8_lossy(&line[..pos]).into_owned();
            state.written.push(command.clone());

            let scripted = state
                .script
                .get_mut(&command)
                .and_then(VecDeque::pop_front);
            let reply = scripted
                .or_else(|| state.fallback.get(&command).cloned())
                .unwrap_or_else(Reply::silent);

            match reply {
                Reply::Bytes(bytes) => state.readable.extend(bytes),
                Reply::WriteError => {
                    return Err(io::Error::new(io::ErrorKind::BrokenPipe, "write failed"));
                },
            }
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Port for MockPort {
    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn set_dtr(&mut self, level: bool) -> Result<()> {
        if self.closed {
            return Err(Error::Transport("port closed".into()));
        }
        self.handle.state().dtr = level;
        Ok(())
    }

    fn set_rts(&mut self, level: bool) -> Result<()> {
        if self.closed {
            return Err(Error::Transport("port closed".into()));
        }
        self.handle.state().rts = level;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.handle.state().close_calls += 1;
        Ok(())
    }
}
