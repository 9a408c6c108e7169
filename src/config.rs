// Link timing, device defaults, process thresholds.

use std::time::Duration;

/// Default line speed of the instrument.
pub const DEFAULT_BAUDRATE: u32 = 38_400;

/// Default 3-bit device id on the shared line.
pub const DEFAULT_DEVICE_ID: u8 = 0x03;

/// Serial read/write timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Device turnaround before reading a register response.
pub const READ_SETTLE: Duration = Duration::from_millis(20);

/// Device turnaround after a register write.
pub const WRITE_SETTLE: Duration = Duration::from_millis(5);

/// Pause between consecutive register polls, keeps the link breathable.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Poller back-off while the bus is disconnected.
pub const POLL_BACKOFF: Duration = Duration::from_millis(100);

/// How long `Poller::stop` waits for the sampling thread to exit.
pub const POLLER_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Foreground queue-drain period.
pub const DRAIN_INTERVAL: Duration = Duration::from_millis(20);

/// Capacity of each per-register sample queue, drop-oldest on overflow.
pub const SAMPLE_QUEUE_CAPACITY: usize = 10;

/// Fast reverse period written while the back-speed override is active.
pub const BACK_SPEED_PERIOD: u16 = 5000;

/// Serial link parameters for one device.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    pub device_id: u8,
    pub baudrate: u32,
    pub timeout: Duration,
    pub read_settle: Duration,
    pub write_settle: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            device_id: DEFAULT_DEVICE_ID,
            baudrate: DEFAULT_BAUDRATE,
            timeout: DEFAULT_TIMEOUT,
            read_settle: READ_SETTLE,
            write_settle: WRITE_SETTLE,
        }
    }
}

/// Thresholds and feature switches for the process automaton.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Feed-motor conversion scale: period_us = scale / speed_mm_min.
    pub motor_speed_m1: f64,
    /// Rotation-motor conversion scale: period_us = scale / speed_rpm.
    pub motor_speed_m2: f64,
    /// Apply the fast reverse period while motor 1 travels backward.
    pub increase_back_speed: bool,
    /// Issue the return stroke automatically when END_BLK asserts.
    pub manual_return: bool,
    /// Begin a purge sequence as part of the return transition.
    pub purge_on_return: bool,
    /// Delay between arming a manual start and issuing the motor commands.
    pub start_delay: Duration,
    /// Valve-2 toggle interval during a purge sequence.
    pub purge_duration: Duration,
    /// Number of purge pulses; the valve toggles twice per pulse.
    pub purge_pulse_count: u32,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            motor_speed_m1: 600_000.0,
            motor_speed_m2: 1_800_000.0,
            increase_back_speed: true,
            manual_return: true,
            purge_on_return: true,
            start_delay: Duration::from_millis(1000),
            purge_duration: Duration::from_millis(3000),
            purge_pulse_count: 3,
        }
    }
}
