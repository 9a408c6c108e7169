// VMK frame construction and parsing.
//
// Every exchange is a fixed 5-byte frame:
// [header, address, data-high, data-low, crc]
// header: 0b11 marker, write bit, data bits 15..14, 3-bit device id.
// The 16-bit payload is split 2 + 7 + 7 across header/data-high/data-low.

use super::crc::crc7;

/// Frame length on the wire, requests and responses alike.
pub const FRAME_LEN: usize = 5;

/// Fixed top bits of the header byte.
const HEADER_MARKER: u8 = 0xC0;
/// Write-direction bit in the header byte.
const WRITE_BIT: u8 = 0x20;

/// Build a request frame for `address` on device `device_id`.
///
/// Read requests carry `data = 0`.
pub fn build_frame(device_id: u8, address: u8, write: bool, data: u16) -> [u8; FRAME_LEN] {
    let header = HEADER_MARKER
        | if write { WRITE_BIT } else { 0 }
        | (((data >> 15) & 0x01) as u8) << 4
        | (((data >> 14) & 0x01) as u8) << 3
        | (device_id & 0x07);

    let mut frame = [
        header,
        address & 0x7F,
        ((data >> 7) & 0x7F) as u8,
        (data & 0x7F) as u8,
        0,
    ];
    frame[4] = crc7(&frame[..4]) & 0x7F;
    frame
}

/// Validate a response frame and extract its 16-bit value.
///
/// Returns `None` on short/long reads, a bad header marker, a device id or
/// address mismatch, or a checksum failure. An invalid frame is never
/// treated as another register's data.
pub fn parse_frame(response: &[u8], expected_address: u8, device_id: u8) -> Option<u16> {
    if response.len() != FRAME_LEN {
        return None;
    }
    if response[0] & HEADER_MARKER != HEADER_MARKER {
        return None;
    }
    if response[0] & 0x07 != device_id & 0x07 {
        return None;
    }
    if response[1] & 0x7F != expected_address & 0x7F {
        return None;
    }
    if crc7(&response[..4]) != response[4] & 0x7F {
        return None;
    }

    Some(
        (((response[0] >> 3) & 0x03) as u16) << 14
            | ((response[2] & 0x7F) as u16) << 7
            | (response[3] & 0x7F) as u16,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEVICE_ID: u8 = 3;

    #[test]
    fn test_read_frame_layout() {
        let frame = build_frame(DEVICE_ID, 0x06, false, 0);
        assert_eq!(frame[0], 0xC0 | DEVICE_ID);
        assert_eq!(frame[1], 0x06);
        assert_eq!(frame[2], 0x00);
        assert_eq!(frame[3], 0x00);
        assert_eq!(frame[4], crc7(&frame[..4]) & 0x7F);
    }

    #[test]
    fn test_write_frame_splits_data() {
        // 0xC123 = 0b11_0000010_0100011: bits 15..14 land in the header
        let frame = build_frame(DEVICE_ID, 0x04, true, 0xC123);
        assert_eq!(frame[0], 0xC0 | 0x20 | (1 << 4) | (1 << 3) | DEVICE_ID);
        assert_eq!(frame[1], 0x04);
        assert_eq!(frame[2], (0xC123 >> 7) as u8 & 0x7F);
        assert_eq!(frame[3], 0x23);
    }

    #[test]
    fn test_round_trip_all_addresses() {
        for address in 0..=0x7F {
            for &data in &[0u16, 1, 0x7F, 0x80, 0x3FFF, 0x4000, 0xC123, u16::MAX] {
                let frame = build_frame(DEVICE_ID, address, true, data);
                assert_eq!(
                    parse_frame(&frame, address, DEVICE_ID),
                    Some(data),
                    "address 0x{address:02X} data 0x{data:04X}"
                );
            }
        }
    }

    #[test]
    fn test_rejects_wrong_length() {
        let frame = build_frame(DEVICE_ID, 0x00, false, 0);
        assert_eq!(parse_frame(&frame[..4], 0x00, DEVICE_ID), None);
        let mut long = frame.to_vec();
        long.push(0);
        assert_eq!(parse_frame(&long, 0x00, DEVICE_ID), None);
    }

    #[test]
    fn test_rejects_mismatches() {
        let frame = build_frame(DEVICE_ID, 0x06, true, 0x1234);
        // wrong expected address
        assert_eq!(parse_frame(&frame, 0x07, DEVICE_ID), None);
        // wrong device id
        assert_eq!(parse_frame(&frame, 0x06, DEVICE_ID ^ 0x01), None);
        // bad header marker
        let mut bad = frame;
        bad[0] &= !0x40;
        assert_eq!(parse_frame(&bad, 0x06, DEVICE_ID), None);
        // corrupted checksum
        let mut bad = frame;
        bad[4] ^= 0x01;
        assert_eq!(parse_frame(&bad, 0x06, DEVICE_ID), None);
    }

    #[test]
    fn test_single_bit_flip_invalidates_frame() {
        let frame = build_frame(DEVICE_ID, 0x12, true, 0xA5A5);
        for byte in 0..4 {
            for bit in 0..8 {
                let mut corrupted = frame;
                corrupted[byte] ^= 1 << bit;
                assert_eq!(
                    parse_frame(&corrupted, 0x12, DEVICE_ID),
                    None,
                    "flip of byte {byte} bit {bit} accepted"
                );
            }
        }
    }
}
