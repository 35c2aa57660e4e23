//! Device communication client.

use std::io::Read;
use std::time::{Duration, Instant};

use anyhow::Result;
use serialport::{SerialPort, SerialPortType};

/// USB vendor ID of the on-board ST-LINK
const STLINK_VID: u16 = 0x0483;

/// Find the ST-LINK virtual COM port the board's USART2 is routed to.
pub fn find_stlink_port() -> Result<String> {
    let ports = serialport::available_ports()?;

    let stlink = ports.iter().find(|info| {
        matches!(&info.port_type, SerialPortType::UsbPort(usb) if usb.vid == STLINK_VID)
    });
    if let Some(info) = stlink {
        return Ok(info.port_name.clone());
    }

    // Fall back to the first CDC-ACM device
    match ports.iter().find(|info| info.port_name.contains("ttyACM")) {
        Some(info) => Ok(info.port_name.clone()),
        None => anyhow::bail!("No ST-LINK port found - ensure the board is connected"),
    }
}

/// Resolve a port argument - returns the port path if not "auto", otherwise auto-detects.
pub fn resolve_port(port_arg: &str) -> Result<String> {
    if port_arg == "auto" {
        find_stlink_port()
    } else {
        Ok(port_arg.to_string())
    }
}

/// Line reader over the board's diagnostic UART.
pub struct DeviceClient {
    port: Box<dyn SerialPort>,
    pending: Vec<u8>,
}

impl DeviceClient {
    /// Create a new device client.
    pub fn new(port_name: &str, baud_rate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_millis(100))
            .open()?;

        Ok(Self {
            port,
            pending: Vec::new(),
        })
    }

    /// Clear any pending data in the serial buffer.
    pub fn clear_buffer(&mut self) -> Result<()> {
        self.port.clear(serialport::ClearBuffer::All)?;
        self.pending.clear();
        Ok(())
    }

    /// Read one line, without its terminator.
    ///
    /// Returns whatever has arrived of an unterminated line once `timeout`
    /// passes, or None if nothing arrived at all. Step prompts stay open for a
    /// whole listen window, so a partial line is normal.
    pub fn read_line(&mut self, timeout: Duration) -> Result<Option<String>> {
        let start = Instant::now();
        let mut buf = [0u8; 64];

        loop {
            if let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.pending.drain(..=pos).collect();
                let text = String::from_utf8_lossy(&line);
                return Ok(Some(text.trim_end_matches(['\r', '\n']).to_string()));
            }

            if start.elapsed() >= timeout {
                if self.pending.is_empty() {
                    return Ok(None);
                }
                let text = String::from_utf8_lossy(&self.pending).into_owned();
                self.pending.clear();
                return Ok(Some(text));
            }

            match self.port.read(&mut buf) {
                Ok(n) => self.pending.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Collect complete lines for `duration`, calling `on_line` for each.
    pub fn capture<F>(&mut self, duration: Duration, mut on_line: F) -> Result<Vec<String>>
    where
        F: FnMut(&str),
    {
        let start = Instant::now();
        let mut lines = Vec::new();

        while start.elapsed() < duration {
            let remaining = duration.saturating_sub(start.elapsed());
            if let Some(line) = self.read_line(remaining)? {
                on_line(&line);
                lines.push(line);
            }
        }

        Ok(lines)
    }
}
