// Sample and status types passed from the poller to the process automaton.

/// One polled register value, passed by value out of the poller's queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub address: u8,
    pub value: u16,
}

/// Decoded device status word.
///
/// The low 11 bits of the status register are named boolean flags; a fresh
/// `StatusWord` is decoded from every drained status sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusWord {
    pub start: bool,
    pub beg_blk: bool,
    pub end_blk: bool,
    pub m1_fwd: bool,
    pub m1_back: bool,
    pub m2_fwd: bool,
    pub m2_back: bool,
    pub valve1_on: bool,
    pub valve2_on: bool,
    pub reset: bool,
    pub ping: bool,
}

impl StatusWord {
    pub fn from_raw(value: u16) -> Self {
        let bit = |i: u16| value & (1 << i) != 0;
        Self {
            start: bit(0),
            beg_blk: bit(1),
            end_blk: bit(2),
            m1_fwd: bit(3),
            m1_back: bit(4),
            m2_fwd: bit(5),
            m2_back: bit(6),
            valve1_on: bit(7),
            valve2_on: bit(8),
            reset: bit(9),
            ping: bit(10),
        }
    }

    /// Motor 1 is moving in either direction.
    pub fn m1_running(&self) -> bool {
        self.m1_fwd || self.m1_back
    }

    /// Motor 2 is moving in either direction.
    pub fn m2_running(&self) -> bool {
        self.m2_fwd || self.m2_back
    }
}

/// Severity attached to every command-log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_decode() {
        let status = StatusWord::from_raw(0);
        assert_eq!(status, StatusWord::default());

        let status = StatusWord::from_raw(0b000_0000_1010);
        assert!(status.beg_blk);
        assert!(status.m1_fwd);
        assert!(!status.end_blk);
        assert!(status.m1_running());
        assert!(!status.m2_running());

        let status = StatusWord::from_raw(0b111_1111_1111);
        assert!(status.start && status.ping && status.valve2_on);
    }

    #[test]
    fn test_high_bits_ignored() {
        let status = StatusWord::from_raw(0xF800);
        assert_eq!(status, StatusWord::default());
    }
}
