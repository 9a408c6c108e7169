// VMK register protocol: 5-byte CRC7-checked frames over a serial line.
//
// Provides:
// - CRC7 checksum (polynomial 0x89)
// - Frame construction and validation
// - The register map of the auger sample-introduction device
// - `VmkBus`, the lock-serialized register transport

pub mod bus;
pub mod crc;
pub mod frame;
pub mod registers;

pub use bus::{RegisterBus, VmkBus, VmkError};
pub use crc::crc7;
pub use frame::{FRAME_LEN, build_frame, parse_frame};
