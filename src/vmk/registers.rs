// Register map and command codes for the auger sample-introduction device.

/// Status word, bits decoded by [`crate::messages::StatusWord`].
pub const REG_STATUS: u8 = 0x00;
/// Process control (CMD_NULL / CMD_START).
pub const REG_CONTROL: u8 = 0x01;
/// Motor 1 (feed auger) command register.
pub const REG_COM_M1: u8 = 0x02;
/// Motor 2 (rotation) command register.
pub const REG_COM_M2: u8 = 0x03;
/// Motor 1 target step period, microseconds.
pub const REG_SET_PERIOD_M1: u8 = 0x04;
/// Motor 2 target step period, microseconds.
pub const REG_SET_PERIOD_M2: u8 = 0x05;
/// Motor 1 measured step period, read-only.
pub const REG_PERIOD_M1: u8 = 0x06;
/// Motor 2 measured step period, read-only.
pub const REG_PERIOD_M2: u8 = 0x07;
/// Start delay, milliseconds.
pub const REG_T_START: u8 = 0x08;
/// End-of-stroke grind pause, milliseconds.
pub const REG_T_GRIND: u8 = 0x09;
/// Purge pulse duration, milliseconds.
pub const REG_T_PURGING: u8 = 0x0A;
/// Valve 1 command register.
pub const REG_COM_V1: u8 = 0x0B;
/// Valve 2 (purge) command register.
pub const REG_COM_V2: u8 = 0x0C;
/// Identification register: high byte id code, low byte firmware version.
pub const REG_VERIFY: u8 = 0x20;

/// Expected high byte of [`REG_VERIFY`].
pub const VERIFY_ID_CODE: u8 = 0x56;

// REG_CONTROL commands
pub const CMD_NULL: u16 = 0;
pub const CMD_START: u16 = 1;

// REG_COM_M1 / REG_COM_M2 commands
pub const MOTOR_CMD_START_FWD: u16 = 1;
pub const MOTOR_CMD_START_BACK: u16 = 2;
pub const MOTOR_CMD_STOP: u16 = 3;

// REG_COM_V1 / REG_COM_V2 commands
pub const VALVE_CMD_OFF: u16 = 0;
pub const VALVE_CMD_ON: u16 = 1;

/// Translate a symbolic setting name to its register address.
pub fn register_for(name: &str) -> Option<u8> {
    match name {
        "SET_PERIOD_M1" => Some(REG_SET_PERIOD_M1),
        "SET_PERIOD_M2" => Some(REG_SET_PERIOD_M2),
        "PERIOD_M1" => Some(REG_PERIOD_M1),
        "PERIOD_M2" => Some(REG_PERIOD_M2),
        "T_START" => Some(REG_T_START),
        "T_GRIND" => Some(REG_T_GRIND),
        "T_PURGING" => Some(REG_T_PURGING),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_map() {
        assert_eq!(register_for("SET_PERIOD_M1"), Some(REG_SET_PERIOD_M1));
        assert_eq!(register_for("T_PURGING"), Some(REG_T_PURGING));
        assert_eq!(register_for("NO_SUCH_SETTING"), None);
    }
}
