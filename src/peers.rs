// Collaborator ports of the process automaton.
//
// Each peer is optional at runtime; the no-op implementations are the
// default wiring so the automaton never has to branch on "is a peer
// configured" beyond what the rules themselves require.

use tracing::{error, info, warn};

use crate::messages::Severity;

/// Command log consumed by the automaton for every command and error.
pub trait CommandLog: Send + Sync {
    fn log(&self, message: &str, severity: Severity);
}

/// Routes command-log entries into `tracing`.
#[derive(Debug, Default)]
pub struct TracingLog;

impl CommandLog for TracingLog {
    fn log(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Info | Severity::Success => info!("{message}"),
            Severity::Warning => warn!("{message}"),
            Severity::Error => error!("{message}"),
        }
    }
}

/// Desintegrator sub-controller, driven opportunistically by the
/// automaton's start/stop and auto-shutdown rules. Speaks its own
/// line-based protocol elsewhere; only this surface is visible here.
pub trait DesintegratorPeer: Send + Sync {
    fn send_start(&self);
    fn send_end(&self);
    fn is_connected(&self) -> bool;
    fn is_running(&self) -> bool;
}

/// Absent desintegrator: never connected, commands are dropped.
#[derive(Debug, Default)]
pub struct NoDesintegrator;

impl DesintegratorPeer for NoDesintegrator {
    fn send_start(&self) {}
    fn send_end(&self) {}

    fn is_connected(&self) -> bool {
        false
    }

    fn is_running(&self) -> bool {
        false
    }
}

/// Flow-sensor peer notified at purge boundaries.
pub trait FlowSensorPeer: Send + Sync {
    /// Purge sequence begins, the measuring line is about to be blown out.
    fn open(&self);
    /// Purge sequence finished, measurement may resume.
    fn start(&self);
}

/// Absent flow sensor.
#[derive(Debug, Default)]
pub struct NoFlowSensor;

impl FlowSensorPeer for NoFlowSensor {
    fn open(&self) {}
    fn start(&self) {}
}
