// Serial register transport for the VMK protocol.
//
// A single mutex wraps every request/response round trip so the background
// poller and foreground writers can never interleave bytes on the wire.

use std::io::{Read, Write};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use serialport::SerialPort;
use tracing::{debug, warn};

use crate::config::LinkConfig;

use super::frame::{FRAME_LEN, build_frame, parse_frame};

/// Error kinds inside the transport. All of them collapse to "no value" at
/// the [`RegisterBus`] boundary; callers only learn that the operation did
/// not succeed.
#[derive(Debug, thiserror::Error)]
pub enum VmkError {
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("port is not open")]
    NotConnected,

    #[error("invalid response for register 0x{address:02X}")]
    InvalidResponse { address: u8 },
}

pub type Result<T> = std::result::Result<T, VmkError>;

/// Register-level access shared by the poller, the automaton and tests.
///
/// The flow-sensor peer speaks the same abstraction over its own transport.
pub trait RegisterBus: Send + Sync {
    fn read_register(&self, address: u8) -> Option<u16>;
    fn write_register(&self, address: u8, value: u16) -> bool;
    fn is_connected(&self) -> bool;
}

/// Byte-level access to the line, mockable in tests.
pub(crate) trait Wire: Send {
    fn clear_input(&mut self) -> Result<()>;
    fn send(&mut self, bytes: &[u8]) -> Result<()>;
    fn recv_exact(&mut self, buf: &mut [u8]) -> Result<()>;
}

impl Wire for Box<dyn SerialPort> {
    fn clear_input(&mut self) -> Result<()> {
        self.clear(serialport::ClearBuffer::Input)?;
        Ok(())
    }

    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_all(bytes)?;
        self.flush()?;
        Ok(())
    }

    fn recv_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.read_exact(buf)?;
        Ok(())
    }
}

/// VMK register transport over a serial port.
pub struct VmkBus {
    device_id: u8,
    read_settle: Duration,
    write_settle: Duration,
    wire: Mutex<Option<Box<dyn Wire>>>,
}

impl VmkBus {
    pub fn new(config: &LinkConfig) -> Self {
        Self {
            device_id: config.device_id & 0x07,
            read_settle: config.read_settle,
            write_settle: config.write_settle,
            wire: Mutex::new(None),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_wire(device_id: u8, wire: Box<dyn Wire>) -> Self {
        Self {
            device_id: device_id & 0x07,
            read_settle: Duration::ZERO,
            write_settle: Duration::ZERO,
            wire: Mutex::new(Some(wire)),
        }
    }

    /// Open the serial port. Returns false if the port cannot be opened,
    /// the only condition treated as fatal to the operation.
    pub fn connect(&self, port: &str, baudrate: u32, timeout: Duration) -> bool {
        match serialport::new(port, baudrate).timeout(timeout).open() {
            Ok(handle) => {
                debug!("opened {port} @ {baudrate}");
                *self.wire.lock() = Some(Box::new(handle));
                true
            }
            Err(e) => {
                warn!("failed to open {port}: {e}");
                false
            }
        }
    }

    /// Close the port. Safe to call when already closed.
    pub fn disconnect(&self) {
        *self.wire.lock() = None;
    }

    /// One locked round trip: clear input, send the request, wait for the
    /// device to turn the line around, read exactly one response frame.
    fn transact(&self, address: u8, write: bool, data: u16, settle: Duration) -> Result<u16> {
        let mut guard = self.wire.lock();
        let wire = guard.as_mut().ok_or(VmkError::NotConnected)?;

        let request = build_frame(self.device_id, address, write, data);
        wire.clear_input()?;
        wire.send(&request)?;
        thread::sleep(settle);

        let mut response = [0u8; FRAME_LEN];
        wire.recv_exact(&mut response)?;
        parse_frame(&response, address, self.device_id).ok_or(VmkError::InvalidResponse { address })
    }
}

impl RegisterBus for VmkBus {
    fn read_register(&self, address: u8) -> Option<u16> {
        match self.transact(address, false, 0, self.read_settle) {
            Ok(value) => Some(value),
            Err(VmkError::NotConnected) => None,
            Err(e) => {
                warn!("read register 0x{address:02X}: {e}");
                None
            }
        }
    }

    fn write_register(&self, address: u8, value: u16) -> bool {
        match self.transact(address, true, value, self.write_settle) {
            Ok(_) => true,
            Err(VmkError::NotConnected) => false,
            Err(e) => {
                warn!("write register 0x{address:02X}: {e}");
                false
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.wire.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    const DEVICE_ID: u8 = 3;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Op {
        Clear,
        Send,
        Recv,
    }

    /// Echoes each request back as the response and records the order of
    /// wire operations. A request frame doubles as a valid response frame.
    struct EchoWire {
        last_request: [u8; FRAME_LEN],
        ops: Arc<Mutex<Vec<Op>>>,
    }

    impl EchoWire {
        fn new(ops: Arc<Mutex<Vec<Op>>>) -> Self {
            Self {
                last_request: [0; FRAME_LEN],
                ops,
            }
        }
    }

    impl Wire for EchoWire {
        fn clear_input(&mut self) -> Result<()> {
            self.ops.lock().push(Op::Clear);
            Ok(())
        }

        fn send(&mut self, bytes: &[u8]) -> Result<()> {
            self.ops.lock().push(Op::Send);
            self.last_request.copy_from_slice(bytes);
            // Give a competing round trip a chance to interleave if the
            // transaction lock were missing.
            thread::sleep(Duration::from_millis(1));
            Ok(())
        }

        fn recv_exact(&mut self, buf: &mut [u8]) -> Result<()> {
            self.ops.lock().push(Op::Recv);
            buf.copy_from_slice(&self.last_request);
            Ok(())
        }
    }

    /// Always times out on receive.
    struct DeafWire;

    impl Wire for DeafWire {
        fn clear_input(&mut self) -> Result<()> {
            Ok(())
        }

        fn send(&mut self, _bytes: &[u8]) -> Result<()> {
            Ok(())
        }

        fn recv_exact(&mut self, _buf: &mut [u8]) -> Result<()> {
            Err(VmkError::Io(std::io::ErrorKind::TimedOut.into()))
        }
    }

    #[test]
    fn test_write_round_trip_succeeds() {
        let ops = Arc::new(Mutex::new(Vec::new()));
        let bus = VmkBus::with_wire(DEVICE_ID, Box::new(EchoWire::new(ops)));
        assert!(bus.is_connected());
        assert!(bus.write_register(0x04, 0x1234));
        assert_eq!(bus.read_register(0x04), Some(0));
    }

    #[test]
    fn test_disconnected_bus_yields_nothing() {
        let link = LinkConfig::default();
        let bus = VmkBus::new(&link);
        assert!(!bus.is_connected());
        assert_eq!(bus.read_register(0x00), None);
        assert!(!bus.write_register(0x01, 1));
        // disconnect is idempotent
        bus.disconnect();
        bus.disconnect();
    }

    #[test]
    fn test_receive_failure_collapses_to_none() {
        let bus = VmkBus::with_wire(DEVICE_ID, Box::new(DeafWire));
        assert_eq!(bus.read_register(0x06), None);
        assert!(!bus.write_register(0x02, 1));
        // the failed round trip does not close the port
        assert!(bus.is_connected());
    }

    #[test]
    fn test_concurrent_round_trips_never_interleave() {
        let ops = Arc::new(Mutex::new(Vec::new()));
        let bus = Arc::new(VmkBus::with_wire(DEVICE_ID, Box::new(EchoWire::new(ops.clone()))));

        let reader = {
            let bus = bus.clone();
            thread::spawn(move || {
                for _ in 0..20 {
                    let _ = bus.read_register(0x00);
                }
            })
        };
        let writer = {
            let bus = bus.clone();
            thread::spawn(move || {
                for _ in 0..20 {
                    let _ = bus.write_register(0x02, 1);
                }
            })
        };
        reader.join().unwrap();
        writer.join().unwrap();

        let ops = ops.lock();
        assert_eq!(ops.len(), 40 * 3);
        for round_trip in ops.chunks(3) {
            assert_eq!(round_trip, [Op::Clear, Op::Send, Op::Recv]);
        }
    }
}
