// Process automaton for the auger sample-introduction instrument.
//
// Owns all mutable process state and is driven from the foreground thread
// only: the poller posts samples into bounded queues, `drain` applies them
// here synchronously. Each decoded status word runs the rule set in a
// fixed order; a failed register write is logged and never aborts the
// remaining rules of the same pass.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{BACK_SPEED_PERIOD, ProcessConfig};
use crate::messages::{Severity, StatusWord};
use crate::peers::{CommandLog, DesintegratorPeer, FlowSensorPeer, NoDesintegrator, NoFlowSensor, TracingLog};
use crate::poller::{PollEntry, SampleQueue};
use crate::vmk::RegisterBus;
use crate::vmk::registers::*;

/// User-facing settings in human units, mirrored to device registers by
/// `apply_settings` / `read_settings`.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Feed rate, mm/min (SET_PERIOD_M1).
    pub feed_speed: f64,
    /// Rotation rate, rpm (SET_PERIOD_M2).
    pub rotation_speed: f64,
    /// Start delay, ms (T_START).
    pub t_start: u16,
    /// End-of-stroke grind pause, ms (T_GRIND).
    pub t_grind: u16,
    /// Purge pulse duration, ms (T_PURGING).
    pub t_purging: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            feed_speed: 17.7,
            rotation_speed: 180.0,
            t_start: 1000,
            t_grind: 1000,
            t_purging: 3000,
        }
    }
}

/// period_us = scale / speed, zero-guarded.
fn speed_to_period(scale: f64, speed: f64) -> u16 {
    if speed > 0.0 {
        (scale / speed).round() as u16
    } else {
        0
    }
}

/// speed = scale / period_us, zero-guarded.
fn period_to_speed(scale: f64, period: u16) -> f64 {
    if period > 0 {
        scale / f64::from(period)
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy)]
struct ManualArm {
    armed_at: Instant,
    with_aux: bool,
}

#[derive(Debug, Clone, Copy)]
struct PurgeState {
    toggles: u32,
    valve_open: bool,
    last_toggle: Instant,
}

/// Mutable automaton state, reset to quiescent on disconnect.
#[derive(Debug, Default)]
struct ProcessState {
    status: StatusWord,
    last_period_m1: u16,
    last_period_m2: u16,
    position_mm: f64,
    feed_seconds: f64,
    last_decode: Option<Instant>,
    manual_arm: Option<ManualArm>,
    back_speed_override: bool,
    purge: Option<PurgeState>,
}

/// The stateful core driving the instrument.
pub struct AugerProcess {
    bus: Arc<dyn RegisterBus>,
    config: ProcessConfig,
    log: Arc<dyn CommandLog>,
    desintegrator: Arc<dyn DesintegratorPeer>,
    flow_sensor: Arc<dyn FlowSensorPeer>,
    status_queue: Arc<SampleQueue>,
    period_m1_queue: Arc<SampleQueue>,
    period_m2_queue: Arc<SampleQueue>,
    settings: Settings,
    state: ProcessState,
}

impl AugerProcess {
    pub fn new(bus: Arc<dyn RegisterBus>, config: ProcessConfig) -> Self {
        Self {
            bus,
            config,
            log: Arc::new(TracingLog),
            desintegrator: Arc::new(NoDesintegrator),
            flow_sensor: Arc::new(NoFlowSensor),
            status_queue: Arc::new(SampleQueue::default()),
            period_m1_queue: Arc::new(SampleQueue::default()),
            period_m2_queue: Arc::new(SampleQueue::default()),
            settings: Settings::default(),
            state: ProcessState::default(),
        }
    }

    pub fn with_command_log(mut self, log: Arc<dyn CommandLog>) -> Self {
        self.log = log;
        self
    }

    pub fn with_desintegrator(mut self, peer: Arc<dyn DesintegratorPeer>) -> Self {
        self.desintegrator = peer;
        self
    }

    pub fn with_flow_sensor(mut self, peer: Arc<dyn FlowSensorPeer>) -> Self {
        self.flow_sensor = peer;
        self
    }

    /// Ordered register list for the background poller: status first, then
    /// the two measured motor periods.
    pub fn polling_config(&self) -> Vec<PollEntry> {
        vec![
            (REG_STATUS, self.status_queue.clone()),
            (REG_PERIOD_M1, self.period_m1_queue.clone()),
            (REG_PERIOD_M2, self.period_m2_queue.clone()),
        ]
    }

    /// Reset to the quiescent posture; called on disconnect.
    pub fn reset(&mut self) {
        self.state = ProcessState::default();
    }

    // ---------------- sample intake ----------------

    /// Drain every sample queue into the automaton.
    pub fn drain(&mut self) {
        self.drain_at(Instant::now());
    }

    pub fn drain_at(&mut self, now: Instant) {
        while let Some(sample) = self.status_queue.pop() {
            self.apply_status(sample.value, now);
        }
        while let Some(sample) = self.period_m1_queue.pop() {
            self.state.last_period_m1 = sample.value;
        }
        while let Some(sample) = self.period_m2_queue.pop() {
            self.state.last_period_m2 = sample.value;
        }
    }

    /// Decode one status sample and run the automaton rules.
    pub fn apply_status(&mut self, raw: u16, now: Instant) {
        let status = StatusWord::from_raw(raw);
        let previous = self.state.status;
        let dt = self
            .state
            .last_decode
            .map_or(Duration::ZERO, |t| now.duration_since(t));
        self.state.last_decode = Some(now);

        self.integrate_position(previous, status, dt.as_secs_f64());
        self.apply_back_speed(previous, status);
        self.control_return_stroke(status, now);
        self.control_manual_start(now);
        self.control_purge(now);
        self.shutdown_auxiliary(status);

        self.state.status = status;
    }

    // ---------------- rule 1: position/time integration ----------------

    fn integrate_position(&mut self, previous: StatusWord, status: StatusWord, dt: f64) {
        if status.beg_blk && !previous.beg_blk && !previous.m1_running() {
            self.state.position_mm = 0.0;
            self.state.feed_seconds = 0.0;
        }

        let rate = self.feed_rate(self.state.last_period_m1);
        if status.m1_fwd {
            self.state.position_mm += rate * dt;
            self.state.feed_seconds += dt;
        }
        if status.m1_back {
            self.state.position_mm -= rate * dt;
        }
    }

    /// Feed rate in mm/s for a measured step period.
    fn feed_rate(&self, period: u16) -> f64 {
        period_to_speed(self.config.motor_speed_m1, period) / 60.0
    }

    // ---------------- rule 2: back-speed override ----------------

    fn apply_back_speed(&mut self, previous: StatusWord, status: StatusWord) {
        if !self.config.increase_back_speed {
            return;
        }
        if status.m1_back && !previous.m1_back {
            // Edge-triggered: fires once per reverse stroke.
            self.command(REG_SET_PERIOD_M1, BACK_SPEED_PERIOD, "back-speed override");
            self.state.back_speed_override = true;
        } else if status.beg_blk && self.state.back_speed_override {
            let period = speed_to_period(self.config.motor_speed_m1, self.settings.feed_speed);
            self.command(REG_SET_PERIOD_M1, period, "restore feed period");
            self.state.back_speed_override = false;
        }
    }

    // ---------------- rule 3: return stroke ----------------

    fn control_return_stroke(&mut self, status: StatusWord, now: Instant) {
        if self.config.manual_return && status.end_blk && !status.m1_back {
            self.log
                .log("end of travel reached, returning carriage", Severity::Info);
            self.motor2_forward();
            self.motor1_backward();
            if self.config.purge_on_return {
                self.begin_purge(now);
            }
        }
        // Carriage back home with motor 2 still turning: stop it.
        if status.beg_blk && status.m2_running() && !status.m1_running() {
            self.motor2_stop();
        }
    }

    // ---------------- rule 4: deferred manual start ----------------

    /// Arm a manual start; the motor commands are issued once the
    /// configured start delay has elapsed.
    pub fn arm_manual_start(&mut self, with_aux: bool) {
        self.arm_manual_start_at(with_aux, Instant::now());
    }

    pub fn arm_manual_start_at(&mut self, with_aux: bool, now: Instant) {
        self.log.log(
            &format!(
                "manual start armed, delay {} ms",
                self.config.start_delay.as_millis()
            ),
            Severity::Info,
        );
        self.state.manual_arm = Some(ManualArm {
            armed_at: now,
            with_aux,
        });
    }

    /// Disarm a pending manual start without issuing any motor command.
    pub fn cancel_manual_start(&mut self) {
        if self.state.manual_arm.take().is_some() {
            self.log.log("manual start cancelled", Severity::Info);
        }
    }

    fn control_manual_start(&mut self, now: Instant) {
        let Some(arm) = self.state.manual_arm else {
            return;
        };
        if now.duration_since(arm.armed_at) < self.config.start_delay {
            return;
        }
        self.state.manual_arm = None;
        self.log
            .log("start delay elapsed, starting motors", Severity::Info);
        self.motor1_forward();
        self.motor2_forward();
        if arm.with_aux && self.desintegrator.is_connected() {
            self.desintegrator.send_start();
        }
    }

    // ---------------- rule 5: purge sequencing ----------------

    /// Begin a purge sequence: valve 2 toggles every purge interval until
    /// `2 × pulse_count` toggles have been issued.
    pub fn start_purge(&mut self) {
        self.begin_purge(Instant::now());
    }

    pub fn begin_purge(&mut self, now: Instant) {
        if self.state.purge.is_some() {
            return;
        }
        self.log.log(
            &format!("purge started, {} pulses", self.config.purge_pulse_count),
            Severity::Info,
        );
        self.flow_sensor.open();
        self.state.purge = Some(PurgeState {
            toggles: 0,
            valve_open: false,
            last_toggle: now,
        });
    }

    fn control_purge(&mut self, now: Instant) {
        let Some(mut purge) = self.state.purge else {
            return;
        };
        if now.duration_since(purge.last_toggle) >= self.config.purge_duration {
            purge.valve_open = !purge.valve_open;
            if purge.valve_open {
                self.valve2_on();
            } else {
                self.valve2_off();
            }
            purge.toggles += 1;
            purge.last_toggle = now;

            if purge.toggles >= 2 * self.config.purge_pulse_count {
                // Force the valve closed no matter where the toggle ended.
                self.valve2_off();
                self.flow_sensor.start();
                self.log.log("purge finished", Severity::Success);
                self.state.purge = None;
                return;
            }
        }
        self.state.purge = Some(purge);
    }

    // ---------------- rule 6: auxiliary shutdown ----------------

    fn shutdown_auxiliary(&mut self, status: StatusWord) {
        if self.desintegrator.is_connected() && self.desintegrator.is_running() && status.m1_back {
            self.log
                .log("carriage returning, stopping desintegrator", Severity::Info);
            self.desintegrator.send_end();
        }
    }

    // ---------------- direct command surface ----------------

    pub fn start_process(&self) -> bool {
        self.command(REG_CONTROL, CMD_START, "process start")
    }

    pub fn stop_process(&self) -> bool {
        self.command(REG_CONTROL, CMD_NULL, "process stop")
    }

    pub fn motor1_forward(&self) -> bool {
        self.command(REG_COM_M1, MOTOR_CMD_START_FWD, "motor 1 forward")
    }

    pub fn motor1_backward(&self) -> bool {
        self.command(REG_COM_M1, MOTOR_CMD_START_BACK, "motor 1 backward")
    }

    pub fn motor1_stop(&self) -> bool {
        self.command(REG_COM_M1, MOTOR_CMD_STOP, "motor 1 stop")
    }

    pub fn motor2_forward(&self) -> bool {
        self.command(REG_COM_M2, MOTOR_CMD_START_FWD, "motor 2 forward")
    }

    pub fn motor2_backward(&self) -> bool {
        self.command(REG_COM_M2, MOTOR_CMD_START_BACK, "motor 2 backward")
    }

    pub fn motor2_stop(&self) -> bool {
        self.command(REG_COM_M2, MOTOR_CMD_STOP, "motor 2 stop")
    }

    pub fn valve1_on(&self) -> bool {
        self.command(REG_COM_V1, VALVE_CMD_ON, "valve 1 open")
    }

    pub fn valve1_off(&self) -> bool {
        self.command(REG_COM_V1, VALVE_CMD_OFF, "valve 1 close")
    }

    pub fn valve2_on(&self) -> bool {
        self.command(REG_COM_V2, VALVE_CMD_ON, "valve 2 open")
    }

    pub fn valve2_off(&self) -> bool {
        self.command(REG_COM_V2, VALVE_CMD_OFF, "valve 2 close")
    }

    /// Manual return stroke: rotation on, feed reversed.
    pub fn go_back(&self) -> bool {
        let m2 = self.motor2_forward();
        let m1 = self.motor1_backward();
        m1 && m2
    }

    fn command(&self, register: u8, value: u16, label: &str) -> bool {
        self.log.log(
            &format!("{label}: reg 0x{register:02X} <- 0x{value:04X}"),
            Severity::Info,
        );
        let ok = self.bus.write_register(register, value);
        if !ok {
            self.log
                .log(&format!("{label}: no response from device"), Severity::Error);
        }
        ok
    }

    // ---------------- verification ----------------

    /// Read the identification register. The high byte must carry the
    /// fixed id code; the low byte is the firmware version.
    pub fn verify_device(&self) -> Option<u8> {
        match self.bus.read_register(REG_VERIFY) {
            Some(value) if (value >> 8) as u8 == VERIFY_ID_CODE => {
                let version = (value & 0xFF) as u8;
                self.log.log(
                    &format!("device identified, firmware version {version}"),
                    Severity::Success,
                );
                Some(version)
            }
            Some(value) => {
                self.log.log(
                    &format!("verification failed: unexpected code 0x{value:04X}"),
                    Severity::Error,
                );
                None
            }
            None => {
                self.log
                    .log("verification failed: no response", Severity::Error);
                None
            }
        }
    }

    // ---------------- settings surface ----------------

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Convert the settings to raw register values and write them all,
    /// logging each result.
    pub fn apply_settings(&mut self, settings: Settings) {
        self.settings = settings;
        for (name, raw) in self.settings_raw() {
            let Some(register) = register_for(name) else {
                continue;
            };
            if self.bus.write_register(register, raw) {
                self.log.log(
                    &format!("applied {name} = {raw} -> reg 0x{register:02X}"),
                    Severity::Success,
                );
            } else {
                self.log
                    .log(&format!("failed to write {name}"), Severity::Error);
            }
        }
    }

    /// Read the setting registers back and convert to human units. A
    /// register that does not answer keeps its previous value.
    pub fn read_settings(&mut self) -> Settings {
        for name in ["SET_PERIOD_M1", "SET_PERIOD_M2", "T_START", "T_GRIND", "T_PURGING"] {
            let Some(register) = register_for(name) else {
                continue;
            };
            let Some(raw) = self.bus.read_register(register) else {
                self.log
                    .log(&format!("failed to read {name}"), Severity::Error);
                continue;
            };
            match name {
                "SET_PERIOD_M1" => {
                    self.settings.feed_speed = period_to_speed(self.config.motor_speed_m1, raw);
                }
                "SET_PERIOD_M2" => {
                    self.settings.rotation_speed =
                        period_to_speed(self.config.motor_speed_m2, raw);
                }
                "T_START" => self.settings.t_start = raw,
                "T_GRIND" => self.settings.t_grind = raw,
                "T_PURGING" => self.settings.t_purging = raw,
                _ => {}
            }
            self.log.log(
                &format!("read {name} = {raw} <- reg 0x{register:02X}"),
                Severity::Success,
            );
        }
        self.settings.clone()
    }

    fn settings_raw(&self) -> [(&'static str, u16); 5] {
        [
            (
                "SET_PERIOD_M1",
                speed_to_period(self.config.motor_speed_m1, self.settings.feed_speed),
            ),
            (
                "SET_PERIOD_M2",
                speed_to_period(self.config.motor_speed_m2, self.settings.rotation_speed),
            ),
            ("T_START", self.settings.t_start),
            ("T_GRIND", self.settings.t_grind),
            ("T_PURGING", self.settings.t_purging),
        ]
    }

    // ---------------- readouts ----------------

    /// Current feed rate, mm/min, from the last measured period.
    pub fn speed_m1(&self) -> f64 {
        period_to_speed(self.config.motor_speed_m1, self.state.last_period_m1)
    }

    /// Current rotation rate, rpm, from the last measured period.
    pub fn speed_m2(&self) -> f64 {
        period_to_speed(self.config.motor_speed_m2, self.state.last_period_m2)
    }

    /// Auger position, mm, integrated from speed over wall-clock time.
    pub fn position_mm(&self) -> f64 {
        self.state.position_mm
    }

    /// Accumulated feed time, seconds.
    pub fn work_time(&self) -> f64 {
        self.state.feed_seconds
    }

    pub fn status(&self) -> StatusWord {
        self.state.status
    }

    /// The carriage is on its way back, the sample has been delivered.
    pub fn is_end_process(&self) -> bool {
        self.state.status.m1_back
    }
}
