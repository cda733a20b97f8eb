//! sink.rs — Byte transports for encoded sentences
//!
//! One sink per simulator:
//!   - stdout (default)
//!   - a file, created or truncated at startup
//!   - a serial device, 8N1 at the configured baud rate
//!   - UDP datagrams, one sentence per datagram
//!
//! Write failures are logged and never stop the run.

use std::io::{self, Write};
use std::net::UdpSocket;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serialport::{DataBits, Parity, StopBits};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::SimError;

const SERIAL_TIMEOUT: Duration = Duration::from_millis(1000);

pub struct SentenceSink {
    name: String,
    out: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for SentenceSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentenceSink").field("name", &self.name).finish()
    }
}

impl SentenceSink {
    /// Wrap any writer. `name` shows up in logs.
    pub fn from_writer(name: impl Into<String>, writer: impl Write + Send + 'static) -> Self {
        Self { name: name.into(), out: Mutex::new(Box::new(writer)) }
    }

    pub fn stdout() -> Self {
        Self::from_writer("stdout", io::stdout())
    }

    /// Swallows everything, for runs that only feed observers.
    pub fn discard() -> Self {
        Self::from_writer("discard", io::sink())
    }

    pub fn file(path: &Path) -> Result<Self, SimError> {
        let file = std::fs::File::create(path).map_err(SimError::Sink)?;
        info!("NMEA output → file {}", path.display());
        Ok(Self::from_writer(format!("file:{}", path.display()), file))
    }

    pub fn serial(port: &str, baud_rate: u32) -> Result<Self, SimError> {
        let device = serialport::new(port, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(SERIAL_TIMEOUT)
            .open()
            .map_err(|e| SimError::Sink(io::Error::from(e)))?;
        info!("NMEA output → serial {port} @ {baud_rate} baud");
        Ok(Self::from_writer(format!("serial:{port}"), device))
    }

    pub fn udp(target: &str) -> Result<Self, SimError> {
        let socket = UdpSocket::bind("0.0.0.0:0").map_err(SimError::Sink)?;
        socket.set_nonblocking(false).map_err(SimError::Sink)?;
        info!("NMEA output → UDP {target}");
        Ok(Self::from_writer(
            format!("udp:{target}"),
            UdpWriter { socket, target: target.to_string() },
        ))
    }

    /// The serial device when one is configured, stdout otherwise.
    pub fn for_config(config: &Config) -> Result<Self, SimError> {
        match &config.serial_port {
            Some(port) => Self::serial(port, config.baud_rate),
            None => Ok(Self::stdout()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Write one tick's sentences in order, then flush.
    pub fn write_sentences(&self, sentences: &[String]) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        for sentence in sentences {
            if let Err(e) = out.write_all(sentence.as_bytes()) {
                warn!("{}: write failed: {e}", self.name);
                return;
            }
        }
        if let Err(e) = out.flush() {
            warn!("{}: flush failed: {e}", self.name);
            return;
        }
        debug!("{} ← {} sentences", self.name, sentences.len());
    }
}

/// Each `write` call is sent as its own datagram.
struct UdpWriter {
    socket: UdpSocket,
    target: String,
}

impl Write for UdpWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.socket.send_to(buf, &self.target)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
