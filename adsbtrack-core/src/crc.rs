//! Mode S CRC-24 (generator 0xFFF409).
//!
//! Extended squitters carry a plain parity field, so a clean DF17/18 frame
//! leaves a zero remainder. Surveillance replies overlay the parity with the
//! aircraft address, which the remainder then recovers.

const GENERATOR: u32 = 0xFFF409;
const MASK: u32 = 0xFF_FFFF;

/// Parity field width in bytes.
const PARITY_LEN: usize = 3;

const fn table_entry(byte: u32) -> u32 {
    let mut crc = byte << 16;
    let mut bit = 0;
    while bit < 8 {
        crc = if crc & 0x80_0000 != 0 {
            (crc << 1) ^ GENERATOR
        } else {
            crc << 1
        };
        bit += 1;
    }
    crc & MASK
}

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < table.len() {
        table[i] = table_entry(i as u32);
        i += 1;
    }
    table
}

static CRC_TABLE: [u32; 256] = build_table();

/// Polynomial division of every byte in `data`.
fn crc24_raw(data: &[u8]) -> u32 {
    data.iter().fold(0u32, |crc, &byte| {
        let idx = ((crc >> 16) as u8 ^ byte) as usize;
        ((crc << 8) ^ CRC_TABLE[idx]) & MASK
    })
}

fn parity_field(data: &[u8]) -> u32 {
    data.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32) & MASK
}

/// Remainder of a whole message: payload CRC XOR the trailing parity field.
///
/// Zero for an intact DF17/18 frame; the address for DF0/4/5/16/20/21.
pub fn crc24(data: &[u8]) -> u32 {
    if data.len() <= PARITY_LEN {
        return parity_field(data);
    }
    let split = data.len() - PARITY_LEN;
    crc24_raw(&data[..split]) ^ parity_field(&data[split..])
}

/// CRC of the payload bytes, i.e. the parity a clean frame should carry.
pub fn crc24_payload(data: &[u8]) -> u32 {
    match data.len().checked_sub(PARITY_LEN) {
        Some(split) if split > 0 => crc24_raw(&data[..split]),
        _ => 0,
    }
}

/// Write the parity field (last 3 bytes) so that `crc24(data) == 0`.
pub fn apply_parity(data: &mut [u8]) {
    if data.len() <= PARITY_LEN {
        return;
    }
    let split = data.len() - PARITY_LEN;
    let parity = crc24_payload(data);
    data[split..].copy_from_slice(&parity.to_be_bytes()[1..]);
}
