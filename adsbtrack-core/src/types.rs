//! Shared types, error enum, and the records that flow through the pipeline.

use serde::{Serialize, Serializer};
use thiserror::Error;

/// All errors produced by adsbtrack-core.
#[derive(Debug, Error)]
pub enum AdsbError {
    #[error("malformed message: {0}")]
    Malformed(#[from] Malformed),
    #[error("CPR zone mismatch: even latitude {lat_even:.4}, odd latitude {lat_odd:.4}")]
    ZoneMismatch { lat_even: f64, lat_odd: f64 },
    #[error("invalid CPR pair: {0}")]
    InvalidPair(&'static str),
    #[error("no input messages")]
    EmptyInput,
    #[error("config error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Reasons a raw message cannot be classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Malformed {
    #[error("frame too short: expected {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },
    #[error("invalid frame marker 0x{0:02X}")]
    BadMarker(u8),
    #[error("unrecognized Beast frame type 0x{0:02X}")]
    UnknownFrameType(u8),
    #[error("unrecognized downlink format: {0}")]
    UnknownDf(u8),
    #[error("null aircraft address")]
    NullAddress,
    #[error("CRC validation failed")]
    CrcFailed,
}

pub type Result<T> = std::result::Result<T, AdsbError>;

// ---------------------------------------------------------------------------
// Downlink Format metadata
// ---------------------------------------------------------------------------

/// Metadata for a Downlink Format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DfInfo {
    pub name: &'static str,
    pub bits: usize,
}

/// Known Downlink Format table.
pub const DF_TABLE: &[(u8, DfInfo)] = &[
    (0, DfInfo { name: "Short air-air surveillance", bits: 56 }),
    (4, DfInfo { name: "Surveillance altitude reply", bits: 56 }),
    (5, DfInfo { name: "Surveillance identity reply", bits: 56 }),
    (11, DfInfo { name: "All-call reply", bits: 56 }),
    (16, DfInfo { name: "Long air-air surveillance", bits: 112 }),
    (17, DfInfo { name: "ADS-B extended squitter", bits: 112 }),
    (18, DfInfo { name: "TIS-B / ADS-R", bits: 112 }),
    (20, DfInfo { name: "Comm-B altitude reply", bits: 112 }),
    (21, DfInfo { name: "Comm-B identity reply", bits: 112 }),
];

/// Look up DF metadata. Returns `None` for unrecognized DFs.
pub fn df_info(df: u8) -> Option<&'static DfInfo> {
    DF_TABLE
        .iter()
        .find(|(d, _)| *d == df)
        .map(|(_, info)| info)
}

// ---------------------------------------------------------------------------
// ICAO address helpers
// ---------------------------------------------------------------------------

/// 24-bit aircraft address, stored as raw bytes. This is the grouping key.
pub type Icao = [u8; 3];

/// Format ICAO address as 6-char uppercase hex string.
pub fn icao_to_string(icao: &Icao) -> String {
    format!("{:02X}{:02X}{:02X}", icao[0], icao[1], icao[2])
}

/// Parse a 6-char hex string into an ICAO address.
pub fn icao_from_hex(hex: &str) -> Option<Icao> {
    if hex.len() != 6 {
        return None;
    }
    let val = u32::from_str_radix(hex, 16).ok()?;
    Some(icao_from_u32(val))
}

/// Build ICAO from a 24-bit integer.
pub fn icao_from_u32(val: u32) -> Icao {
    [
        ((val >> 16) & 0xFF) as u8,
        ((val >> 8) & 0xFF) as u8,
        (val & 0xFF) as u8,
    ]
}

fn serialize_icao<S: Serializer>(icao: &Icao, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&icao_to_string(icao))
}

// ---------------------------------------------------------------------------
// Hex utilities
// ---------------------------------------------------------------------------

/// Decode a hex string into bytes. Case-insensitive; surrounding whitespace
/// is ignored. `None` on odd length or a non-hex digit.
pub fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    let digits = hex.trim().as_bytes();
    if digits.len() % 2 != 0 {
        return None;
    }
    digits
        .chunks_exact(2)
        .map(|pair| Some((nibble(pair[0])? << 4) | nibble(pair[1])?))
        .collect()
}

/// Encode bytes as an uppercase hex string.
pub fn hex_encode(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02X}")).collect()
}

fn nibble(c: u8) -> Option<u8> {
    (c as char).to_digit(16).map(|d| d as u8)
}

// ---------------------------------------------------------------------------
// Pipeline records
// ---------------------------------------------------------------------------

/// One captured message as supplied by the loader.
#[derive(Debug, Clone, PartialEq)]
pub struct RawMessage {
    /// Beast-framed message bytes
    pub bytes: Vec<u8>,
    /// Capture time, Unix seconds
    pub timestamp: f64,
    pub receiver_id: String,
}

impl RawMessage {
    pub fn new(bytes: Vec<u8>, timestamp: f64, receiver_id: impl Into<String>) -> Self {
        RawMessage {
            bytes,
            timestamp,
            receiver_id: receiver_id.into(),
        }
    }
}

/// CPR format flag of a position message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CprFormat {
    Even,
    Odd,
    NotApplicable,
}

impl CprFormat {
    /// The opposite parity. `NotApplicable` has no opposite.
    pub fn opposite(self) -> CprFormat {
        match self {
            CprFormat::Even => CprFormat::Odd,
            CprFormat::Odd => CprFormat::Even,
            CprFormat::NotApplicable => CprFormat::NotApplicable,
        }
    }

    pub fn is_position(self) -> bool {
        self != CprFormat::NotApplicable
    }
}

/// Encoded 17-bit CPR latitude/longitude fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CprCoords {
    pub lat: u32,
    pub lon: u32,
}

/// Decoded aircraft position. One per successfully decoded pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    #[serde(rename = "icao", serialize_with = "serialize_icao")]
    pub identity: Icao,
    pub latitude: f64,
    pub longitude: f64,
    /// Timestamp of the later message in the pair
    pub timestamp: f64,
}

/// A position that passed the geo filter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilteredPosition {
    #[serde(flatten)]
    pub position: Position,
    pub distance_miles: f64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
