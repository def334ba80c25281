//! Byte transports between the driver and the NCP.
//!
//! Transports are synchronous and short-timeout: `read` returns `Ok(0)` when
//! nothing arrived within its read timeout, so the driver can poll it from
//! its event loop without stalling for long.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};

use super::error::NcpResult;
use crate::spinel::hdlc::{hdlc_encode, HdlcDecoder};

pub trait Transport: Send {
    /// Read available bytes. `Ok(0)` means nothing arrived before the read timeout.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Try to bring a failed link back.
    fn reconnect(&mut self) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "transport cannot reconnect",
        ))
    }

    fn name(&self) -> &str;
}

#[cfg(feature = "serial")]
pub use serial::SerialTransport;

#[cfg(feature = "serial")]
mod serial {
    use std::io::{self, Read, Write};
    use std::time::Duration;

    use anyhow::{anyhow, Result};
    use log::{debug, info};
    use serialport::SerialPort;

    use super::Transport;

    /// UART link to the NCP.
    pub struct SerialTransport {
        port_name: String,
        baud_rate: u32,
        read_timeout: Duration,
        port: Option<Box<dyn SerialPort>>,
    }

    impl SerialTransport {
        pub fn open(port_name: &str, baud_rate: u32, read_timeout: Duration) -> Result<Self> {
            let mut transport = Self::closed(port_name, baud_rate, read_timeout);
            transport
                .connect()
                .map_err(|e| anyhow!("Failed to open serial port {}: {}", port_name, e))?;
            Ok(transport)
        }

        /// A transport that starts disconnected and opens the port on `reconnect`.
        pub fn closed(port_name: &str, baud_rate: u32, read_timeout: Duration) -> Self {
            Self {
                port_name: port_name.to_string(),
                baud_rate,
                read_timeout,
                port: None,
            }
        }

        pub fn is_open(&self) -> bool {
            self.port.is_some()
        }

        fn connect(&mut self) -> io::Result<()> {
            let mut builder = serialport::new(&self.port_name, self.baud_rate).timeout(self.read_timeout);
            #[cfg(unix)]
            {
                builder = builder
                    .data_bits(serialport::DataBits::Eight)
                    .stop_bits(serialport::StopBits::One)
                    .parity(serialport::Parity::None)
                    .flow_control(serialport::FlowControl::None);
            }
            let port = builder.open()?;
            // whatever the NCP printed before we attached is not framed for us
            let _ = port.clear(serialport::ClearBuffer::Input);
            info!("Opened {} at {} baud", self.port_name, self.baud_rate);
            self.port = Some(port);
            Ok(())
        }

        fn port(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
            self.port.as_mut().ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotConnected, "serial port is not open")
            })
        }
    }

    impl Transport for SerialTransport {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let result = self.port()?.read(buf);
            match result {
                Ok(n) => Ok(n),
                Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
                Err(e) => {
                    debug!("serial read on {} failed: {}", self.port_name, e);
                    self.port = None;
                    Err(e)
                }
            }
        }

        fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
            let port = self.port()?;
            let result = port.write_all(data).and_then(|_| port.flush());
            if result.is_err() {
                self.port = None;
            }
            result
        }

        fn reconnect(&mut self) -> io::Result<()> {
            self.port = None;
            self.connect()
        }

        fn name(&self) -> &str {
            &self.port_name
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    inbound: VecDeque<u8>,
    written: Vec<u8>,
    connected: bool,
    reconnects: usize,
}

/// In-memory transport. Clones share the same link, so a test keeps one
/// clone to play the NCP while the driver owns the other.
#[derive(Debug, Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                connected: true,
                ..MockState::default()
            })),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue raw bytes for the driver to read.
    pub fn push_bytes(&self, bytes: &[u8]) {
        self.lock().inbound.extend(bytes.iter().copied());
    }

    /// Queue one Spinel frame, HDLC-wrapped.
    pub fn push_frame(&self, frame: &[u8]) {
        self.push_bytes(&hdlc_encode(frame));
    }

    /// Everything written so far, unwrapped into Spinel frames. Clears the buffer.
    pub fn take_frames(&self) -> Vec<Vec<u8>> {
        let written = std::mem::take(&mut self.lock().written);
        HdlcDecoder::new().push(&written).frames
    }

    pub fn disconnect(&self) {
        let mut state = self.lock();
        state.connected = false;
        state.inbound.clear();
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    pub fn reconnects(&self) -> usize {
        self.lock().reconnects
    }

    /// Frames the driver wrote, decoded into Spinel frames with their commands.
    pub fn take_parsed(&self) -> NcpResult<Vec<crate::spinel::SpinelFrame>> {
        self.take_frames()
            .iter()
            .map(|f| crate::spinel::SpinelFrame::parse(f))
            .collect()
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.lock();
        if !state.connected {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock link down"));
        }
        let n = buf.len().min(state.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let mut state = self.lock();
        if !state.connected {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock link down"));
        }
        state.written.extend_from_slice(data);
        Ok(())
    }

    fn reconnect(&mut self) -> io::Result<()> {
        let mut state = self.lock();
        state.reconnects += 1;
        state.connected = true;
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
