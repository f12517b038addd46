//! Beast binary framing.
//!
//! Layout after unescaping:
//!
//! ```text
//! 0x1A | type | 6-byte MLAT counter | signal | Mode S payload
//! ```
//!
//! - type `'2'`: Mode S short, 7-byte payload (16 bytes total)
//! - type `'3'`: Mode S long, 14-byte payload (23 bytes total)
//! - type `'1'`: Mode A/C, carries no aircraft address and is rejected
//!
//! Any `0x1A` byte after the marker is sent doubled on the wire.

use crate::types::Malformed;

/// Frame marker / escape byte.
pub const ESCAPE: u8 = 0x1A;

const HEADER_LEN: usize = 9;

/// Beast frame type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    ModeSShort,
    ModeSLong,
}

impl FrameKind {
    fn from_byte(b: u8) -> Result<Self, Malformed> {
        match b {
            b'2' => Ok(FrameKind::ModeSShort),
            b'3' => Ok(FrameKind::ModeSLong),
            other => Err(Malformed::UnknownFrameType(other)),
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            FrameKind::ModeSShort => b'2',
            FrameKind::ModeSLong => b'3',
        }
    }

    /// Mode S payload length in bytes.
    pub fn payload_len(self) -> usize {
        match self {
            FrameKind::ModeSShort => 7,
            FrameKind::ModeSLong => 14,
        }
    }
}

/// A decoded Beast frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeastFrame {
    pub kind: FrameKind,
    /// 48-bit receiver MLAT counter
    pub mlat: u64,
    pub signal: u8,
    pub payload: Vec<u8>,
}

impl BeastFrame {
    /// Wrap a Mode S payload. The frame kind follows the payload length.
    pub fn mode_s(payload: &[u8], mlat: u64, signal: u8) -> Result<Self, Malformed> {
        let kind = match payload.len() {
            7 => FrameKind::ModeSShort,
            14 => FrameKind::ModeSLong,
            n => {
                return Err(Malformed::TooShort {
                    expected: 14,
                    actual: n,
                })
            }
        };
        Ok(BeastFrame {
            kind,
            mlat: mlat & 0xFFFF_FFFF_FFFF,
            signal,
            payload: payload.to_vec(),
        })
    }

    /// Encode to wire bytes, doubling every escape byte after the marker.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(HEADER_LEN - 1 + self.payload.len());
        body.push(self.kind.to_byte());
        body.extend_from_slice(&self.mlat.to_be_bytes()[2..]);
        body.push(self.signal);
        body.extend_from_slice(&self.payload);

        let mut out = Vec::with_capacity(body.len() + 4);
        out.push(ESCAPE);
        for b in body {
            out.push(b);
            if b == ESCAPE {
                out.push(ESCAPE);
            }
        }
        out
    }
}

/// Parse one Beast frame.
///
/// Trailing bytes beyond the frame are ignored.
pub fn parse_beast(bytes: &[u8]) -> Result<BeastFrame, Malformed> {
    let Some(&marker) = bytes.first() else {
        return Err(Malformed::TooShort {
            expected: HEADER_LEN,
            actual: 0,
        });
    };
    if marker != ESCAPE {
        return Err(Malformed::BadMarker(marker));
    }

    let body = unescape(&bytes[1..]);
    let Some(&type_byte) = body.first() else {
        return Err(Malformed::TooShort {
            expected: HEADER_LEN,
            actual: 1,
        });
    };
    let kind = FrameKind::from_byte(type_byte)?;

    let expected = HEADER_LEN + kind.payload_len();
    if body.len() + 1 < expected {
        return Err(Malformed::TooShort {
            expected,
            actual: body.len() + 1,
        });
    }

    let mlat = body[1..7]
        .iter()
        .fold(0u64, |acc, &b| (acc << 8) | b as u64);
    let signal = body[7];
    let payload = body[8..8 + kind.payload_len()].to_vec();

    Ok(BeastFrame {
        kind,
        mlat,
        signal,
        payload,
    })
}

/// Collapse `0x1A 0x1A` pairs into a single `0x1A`.
fn unescape(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter().copied().peekable();
    while let Some(b) = iter.next() {
        out.push(b);
        if b == ESCAPE && iter.peek() == Some(&ESCAPE) {
            iter.next();
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
