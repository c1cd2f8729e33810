use anyhow::{Context, Result};
use log::{debug, info};
use serialport::{ClearBuffer, SerialPort};
use std::{io::BufReader, thread, time::Duration};

#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub port: String,
    pub baud_rate: u32,
    /// Per-read timeout; timed-out reads are retried by the acquisition loop.
    pub read_timeout: Duration,
    /// Boards that reset on open need a moment before they stream.
    pub settle: Duration,
}

/// Open the device, wait for it to settle and drop whatever it printed meanwhile.
pub fn open(settings: &SerialSettings) -> Result<BufReader<Box<dyn SerialPort>>> {
    let port = serialport::new(&settings.port, settings.baud_rate)
        .timeout(settings.read_timeout)
        .open()
        .with_context(|| format!("failed to open serial port {}", settings.port))?;
    info!(
        "opened {} at {} baud, settling for {:?}",
        settings.port, settings.baud_rate, settings.settle
    );
    if !settings.settle.is_zero() {
        thread::sleep(settings.settle);
    }
    if let Err(err) = port.clear(ClearBuffer::Input) {
        debug!("could not flush input buffer: {}", err);
    }
    Ok(BufReader::new(port))
}

pub fn list_ports() -> Result<Vec<String>> {
    let ports = serialport::available_ports().context("enumerating serial ports")?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}
