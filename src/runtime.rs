// Foreground driver loop.
//
// Owns the bus, the background poller and the process automaton: connects,
// verifies the device, starts polling and then periodically drains the
// sample queues into the automaton until the link drops.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{DRAIN_INTERVAL, LinkConfig, POLL_INTERVAL, ProcessConfig};
use crate::poller::Poller;
use crate::process::AugerProcess;
use crate::vmk::{RegisterBus, VmkBus};

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("failed to open serial port {port}")]
    Connect { port: String },

    #[error("poller failed to start")]
    PollerStart,
}

/// Run the drive loop on `port` until the connection drops.
pub fn run(port: &str, baudrate: u32, device_id: u8) -> Result<(), RuntimeError> {
    let link = LinkConfig {
        device_id,
        baudrate,
        ..LinkConfig::default()
    };
    let bus = Arc::new(VmkBus::new(&link));
    if !bus.connect(port, link.baudrate, link.timeout) {
        return Err(RuntimeError::Connect { port: port.into() });
    }
    info!("connected to {port} @ {baudrate}, device id {device_id}");

    let mut process = AugerProcess::new(bus.clone(), ProcessConfig::default());
    match process.verify_device() {
        Some(version) => info!("device verified, firmware version {version}"),
        None => warn!("device verification failed, continuing anyway"),
    }

    let poller = Poller::new(bus.clone(), POLL_INTERVAL);
    poller.set_polling_config(process.polling_config());
    poller.on_cycle_time(|elapsed| debug!("poll cycle took {} ms", elapsed.as_millis()));
    if !poller.start() {
        bus.disconnect();
        return Err(RuntimeError::PollerStart);
    }

    info!(
        "runtime started: {} ms drain period, {} ms per-register poll delay",
        DRAIN_INTERVAL.as_millis(),
        POLL_INTERVAL.as_millis()
    );

    let mut last_report = std::time::Instant::now();
    while bus.is_connected() {
        process.drain();

        if last_report.elapsed() >= Duration::from_secs(1) {
            last_report = std::time::Instant::now();
            debug!(
                "position {:.2} mm, feed {:.1} mm/min, rotation {:.1} rpm",
                process.position_mm(),
                process.speed_m1(),
                process.speed_m2()
            );
        }
        thread::sleep(DRAIN_INTERVAL);
    }

    warn!("connection lost, shutting down");
    poller.stop();
    process.reset();
    Ok(())
}
