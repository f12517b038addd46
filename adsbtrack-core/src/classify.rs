//! Message classification and per-aircraft grouping.
//!
//! Unwraps the Beast frame, parses the Mode S payload, and tags each message
//! with its aircraft identity, type code, and CPR format. Grouping buckets
//! classified messages by identity in time order and drops receiver
//! duplicates of the same transmission.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::beast::parse_beast;
use crate::frame::{parse_payload, ModeFrame};
use crate::types::{icao_to_string, CprCoords, CprFormat, Icao, Malformed, RawMessage, Result};

/// A raw message with its derived identity and position metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedMessage {
    pub raw: RawMessage,
    pub frame: ModeFrame,
    pub type_code: Option<u8>,
    pub cpr_format: CprFormat,
    /// Present exactly when `cpr_format` is `Even` or `Odd`
    pub cpr: Option<CprCoords>,
}

impl ClassifiedMessage {
    pub fn identity(&self) -> Icao {
        self.frame.icao
    }

    pub fn timestamp(&self) -> f64 {
        self.raw.timestamp
    }
}

/// Classification options.
#[derive(Debug, Clone, Copy, Default)]
pub struct Classifier {
    /// Reject explicit-address frames whose CRC remainder is non-zero
    pub require_crc: bool,
}

impl Classifier {
    pub fn new(require_crc: bool) -> Self {
        Classifier { require_crc }
    }

    pub fn classify(&self, raw: &RawMessage) -> Result<ClassifiedMessage> {
        let beast = parse_beast(&raw.bytes)?;
        let frame = parse_payload(&beast.payload)?;
        if self.require_crc && !frame.crc_ok {
            return Err(Malformed::CrcFailed.into());
        }

        Ok(ClassifiedMessage {
            type_code: frame.type_code(),
            cpr_format: frame.cpr_format(),
            cpr: frame.cpr_coords(),
            frame,
            raw: raw.clone(),
        })
    }
}

/// Classify with default options.
pub fn classify(raw: &RawMessage) -> Result<ClassifiedMessage> {
    Classifier::default().classify(raw)
}

/// Messages bucketed by identity, each bucket in time order.
pub type IdentityGroups = BTreeMap<Icao, Vec<ClassifiedMessage>>;

/// Bucket messages by identity.
///
/// Each bucket is stably sorted by timestamp, so equal timestamps keep their
/// arrival order. A message whose Mode S payload repeats one already kept
/// for that identity within `dedup_window` seconds is dropped. Returns the
/// groups and the number of duplicates dropped.
pub fn group_by_identity(
    messages: impl IntoIterator<Item = ClassifiedMessage>,
    dedup_window: f64,
) -> (IdentityGroups, usize) {
    let mut groups = IdentityGroups::new();
    for msg in messages {
        groups.entry(msg.identity()).or_default().push(msg);
    }

    let mut duplicates = 0;
    for (icao, bucket) in groups.iter_mut() {
        bucket.sort_by(|a, b| a.timestamp().total_cmp(&b.timestamp()));

        let mut last_kept: HashMap<Vec<u8>, f64> = HashMap::new();
        let before = bucket.len();
        bucket.retain(|msg| {
            let ts = msg.timestamp();
            if let Some(&seen) = last_kept.get(&msg.frame.raw) {
                if ts - seen <= dedup_window {
                    return false;
                }
            }
            last_kept.insert(msg.frame.raw.clone(), ts);
            true
        });

        let dropped = before - bucket.len();
        if dropped > 0 {
            debug!(icao = %icao_to_string(icao), dropped, "dropped duplicate receptions");
        }
        duplicates += dropped;
    }

    (groups, duplicates)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
