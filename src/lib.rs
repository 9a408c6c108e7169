// Runtime for an auger sample-introduction instrument on a VMK serial link.
//
// Provides:
// - The VMK 5-byte register protocol with CRC7 integrity checking
// - A lock-serialized serial transport shared by two threads
// - A background poller feeding bounded per-register sample queues
// - The process automaton: deferred manual start, automatic return
//   stroke, purge pulse sequencing, back-speed override

pub mod config;
pub mod messages;
pub mod peers;
pub mod poller;
pub mod process;
pub mod runtime;
pub mod vmk;

pub use messages::{Sample, Severity, StatusWord};
pub use peers::{CommandLog, DesintegratorPeer, FlowSensorPeer};
pub use poller::{Poller, SampleQueue};
pub use process::{AugerProcess, Settings};
pub use vmk::{RegisterBus, VmkBus, VmkError};
