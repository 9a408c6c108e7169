// CRC7 checksum used by the VMK frame trailer.
//
// Polynomial 0x89 (x^7 + x^3 + 1), bit-serial division, no reflection,
// zero initial value. Same scheme as the SD/MMC command checksum.

/// Generator polynomial, x^7 + x^3 + 1.
pub const CRC7_POLYNOMIAL: u8 = 0x89;

/// Compute the 7-bit checksum of `bytes`.
pub fn crc7(bytes: &[u8]) -> u8 {
    let mut crc: u8 = 0;
    for &byte in bytes {
        crc ^= byte;
        for _ in 0..8 {
            if crc & 0x80 != 0 {
                crc ^= CRC7_POLYNOMIAL;
            }
            crc <<= 1;
        }
    }
    crc >> 1
}
