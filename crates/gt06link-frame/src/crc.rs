//! CRC16 as computed by GT06 receivers.
//!
//! Reflected polynomial `0xA001`, initial value `0xFFFF`, no final XOR
//! (the CRC-16/MODBUS parameter set). A receiver silently drops frames whose
//! CRC differs, so this must match bit for bit.

const INITIAL: u16 = 0xFFFF;
const POLY: u16 = 0xA001;

/// Compute the frame checksum over `data`.
pub fn checksum(data: &[u8]) -> u16 {
    let mut crc = INITIAL;
    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            crc = if crc & 0x0001 != 0 {
                (crc >> 1) ^ POLY
            } else {
                crc >> 1
            };
        }
    }
    crc
}
