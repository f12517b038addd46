//! Parse Mode S payloads into structured frames.
//!
//! Responsibilities:
//! - Classify Downlink Format (DF) from first 5 bits
//! - Extract ICAO address (bytes 1-3 for DF11/17/18, or from CRC residual)
//! - Expose the ADS-B type code and CPR fields of extended squitters
//! - Build CRC-correct airborne position frames

use crate::cpr;
use crate::crc;
use crate::types::{df_info, CprCoords, CprFormat, Icao, Malformed};

// DFs where ICAO is explicit in bytes 1-3
const DF_EXPLICIT_ICAO: &[u8] = &[11, 17, 18];

// DFs where ICAO is recovered from CRC residual
const DF_RESIDUAL_ICAO: &[u8] = &[0, 4, 5, 16, 20, 21];

/// True for the ADS-B type codes that carry an airborne CPR position.
pub fn is_position_type_code(tc: u8) -> bool {
    (9..=18).contains(&tc) || (20..=22).contains(&tc)
}

/// A parsed Mode S frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeFrame {
    /// Downlink Format (0-24)
    pub df: u8,
    /// 3-byte ICAO address
    pub icao: Icao,
    /// Full message bytes
    pub raw: Vec<u8>,
    /// Message length in bits (56 or 112)
    pub msg_bits: usize,
    /// CRC remainder was zero. Always true for residual-address DFs.
    pub crc_ok: bool,
}

impl ModeFrame {
    /// True if this is a 112-bit (long) message.
    pub fn is_long(&self) -> bool {
        self.msg_bits == 112
    }

    /// Message Extended field (bytes 4-10, 56 bits) for DF17/18.
    /// Returns empty slice for short frames.
    pub fn me(&self) -> &[u8] {
        if self.is_long() && self.raw.len() >= 11 {
            &self.raw[4..11]
        } else {
            &[]
        }
    }

    /// ADS-B Type Code (first 5 bits of ME field). None for non-ADS-B.
    pub fn type_code(&self) -> Option<u8> {
        if (self.df != 17 && self.df != 18) || !self.is_long() {
            return None;
        }
        self.raw.get(4).map(|b| (b >> 3) & 0x1F)
    }

    fn me_bits(&self) -> Option<u64> {
        let me = self.me();
        if me.len() < 7 {
            return None;
        }
        let mut buf = [0u8; 8];
        buf[1..8].copy_from_slice(me);
        Some(u64::from_be_bytes(buf))
    }

    /// CPR format flag (ME bit 22). `NotApplicable` unless the type code
    /// carries an airborne position.
    pub fn cpr_format(&self) -> CprFormat {
        match (self.type_code(), self.me_bits()) {
            (Some(tc), Some(bits)) if is_position_type_code(tc) => {
                if (bits >> 34) & 1 == 1 {
                    CprFormat::Odd
                } else {
                    CprFormat::Even
                }
            }
            _ => CprFormat::NotApplicable,
        }
    }

    /// Encoded 17-bit CPR latitude and longitude of a position frame.
    pub fn cpr_coords(&self) -> Option<CprCoords> {
        if !self.cpr_format().is_position() {
            return None;
        }
        let bits = self.me_bits()?;
        Some(CprCoords {
            lat: ((bits >> 17) & 0x1FFFF) as u32,
            lon: (bits & 0x1FFFF) as u32,
        })
    }

    /// Build a DF17 airborne position frame for `(lat, lon)`.
    ///
    /// Altitude and surveillance status are left zero; the parity field is
    /// filled in so the frame passes CRC.
    pub fn airborne_position(icao: Icao, type_code: u8, format: CprFormat, lat: f64, lon: f64) -> ModeFrame {
        let coords = cpr::encode(lat, lon, format);
        let f_bit = u64::from(format == CprFormat::Odd);
        let me: u64 = ((type_code as u64 & 0x1F) << 51)
            | (f_bit << 34)
            | ((coords.lat as u64) << 17)
            | coords.lon as u64;

        let mut raw = vec![0u8; 14];
        raw[0] = 17 << 3 | 5;
        raw[1..4].copy_from_slice(&icao);
        raw[4..11].copy_from_slice(&me.to_be_bytes()[1..]);
        crc::apply_parity(&mut raw);

        ModeFrame {
            df: 17,
            icao,
            raw,
            msg_bits: 112,
            crc_ok: true,
        }
    }
}

/// Parse a Mode S payload into a `ModeFrame`.
pub fn parse_payload(payload: &[u8]) -> Result<ModeFrame, Malformed> {
    let Some(&first) = payload.first() else {
        return Err(Malformed::TooShort {
            expected: 7,
            actual: 0,
        });
    };
    let df = (first >> 3) & 0x1F;
    let info = df_info(df).ok_or(Malformed::UnknownDf(df))?;

    let msg_bits = payload.len() * 8;
    if msg_bits != info.bits {
        return Err(Malformed::TooShort {
            expected: info.bits / 8,
            actual: payload.len(),
        });
    }

    let remainder = crc::crc24(payload);
    let (icao, crc_ok) = if DF_EXPLICIT_ICAO.contains(&df) {
        ([payload[1], payload[2], payload[3]], remainder == 0)
    } else if DF_RESIDUAL_ICAO.contains(&df) {
        (
            [
                ((remainder >> 16) & 0xFF) as u8,
                ((remainder >> 8) & 0xFF) as u8,
                (remainder & 0xFF) as u8,
            ],
            true,
        )
    } else {
        return Err(Malformed::UnknownDf(df));
    };

    if icao == [0, 0, 0] {
        return Err(Malformed::NullAddress);
    }

    Ok(ModeFrame {
        df,
        icao,
        raw: payload.to_vec(),
        msg_bits,
        crc_ok,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
