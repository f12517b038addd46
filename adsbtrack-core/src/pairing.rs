//! CPR even/odd pairing.
//!
//! For one aircraft's time-ordered messages, match each even position frame
//! with an odd one received within the pairing window. Frames without a
//! partner are dropped; packet loss makes that routine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::classify::ClassifiedMessage;
use crate::cpr::MAX_PAIR_AGE;
use crate::types::{AdsbError, CprCoords, CprFormat, Icao, Result};

/// A matched even/odd frame pair for one aircraft.
///
/// Borrowed from the identity's message bucket and consumed by the decoder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CprPair<'a> {
    even: &'a ClassifiedMessage,
    odd: &'a ClassifiedMessage,
    even_coords: CprCoords,
    odd_coords: CprCoords,
}

impl<'a> CprPair<'a> {
    /// Pair two position messages in either order.
    pub fn new(a: &'a ClassifiedMessage, b: &'a ClassifiedMessage) -> Result<Self> {
        if a.identity() != b.identity() {
            return Err(AdsbError::InvalidPair("messages belong to different aircraft"));
        }
        let (even, odd) = match (a.cpr_format, b.cpr_format) {
            (CprFormat::Even, CprFormat::Odd) => (a, b),
            (CprFormat::Odd, CprFormat::Even) => (b, a),
            (CprFormat::NotApplicable, _) | (_, CprFormat::NotApplicable) => {
                return Err(AdsbError::InvalidPair("message carries no CPR position"))
            }
            _ => return Err(AdsbError::InvalidPair("messages share the same CPR format")),
        };
        let (Some(even_coords), Some(odd_coords)) = (even.cpr, odd.cpr) else {
            return Err(AdsbError::InvalidPair("message carries no CPR position"));
        };

        Ok(CprPair {
            even,
            odd,
            even_coords,
            odd_coords,
        })
    }

    pub fn identity(&self) -> Icao {
        self.even.identity()
    }

    pub fn even(&self) -> &'a ClassifiedMessage {
        self.even
    }

    pub fn odd(&self) -> &'a ClassifiedMessage {
        self.odd
    }

    pub fn even_coords(&self) -> CprCoords {
        self.even_coords
    }

    pub fn odd_coords(&self) -> CprCoords {
        self.odd_coords
    }

    /// Timestamp of the later frame.
    pub fn timestamp(&self) -> f64 {
        self.even.timestamp().max(self.odd.timestamp())
    }

    /// Absolute time between the two frames.
    pub fn gap(&self) -> f64 {
        (self.even.timestamp() - self.odd.timestamp()).abs()
    }
}

/// How frames are matched when more than two fall inside the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingStrategy {
    /// Greedy matching of the closest opposite-parity frames first
    #[default]
    NearestNeighbor,
    /// Hold the latest even and odd frame; once both are held, emit them if
    /// inside the window and clear both slots either way
    Sequential,
}

impl FromStr for PairingStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "nearest_neighbor" | "nearest" => Ok(PairingStrategy::NearestNeighbor),
            "sequential" => Ok(PairingStrategy::Sequential),
            other => Err(format!("unknown pairing strategy: {other}")),
        }
    }
}

/// Matches even/odd CPR frames within a validity window.
#[derive(Debug, Clone, Copy)]
pub struct PairingEngine {
    pub window: f64,
    pub strategy: PairingStrategy,
}

impl Default for PairingEngine {
    fn default() -> Self {
        PairingEngine {
            window: MAX_PAIR_AGE,
            strategy: PairingStrategy::default(),
        }
    }
}

impl PairingEngine {
    pub fn new(window: f64, strategy: PairingStrategy) -> Self {
        PairingEngine { window, strategy }
    }

    /// Pair the CPR position frames among `messages`.
    ///
    /// Messages are expected to belong to one aircraft; frames of different
    /// identities are never paired. Non-position messages are ignored.
    /// Pairs are returned ordered by their later timestamp. No message
    /// appears in more than one pair.
    pub fn pair<'a>(&self, messages: &'a [ClassifiedMessage]) -> Vec<CprPair<'a>> {
        let mut frames: Vec<&'a ClassifiedMessage> = messages
            .iter()
            .filter(|m| m.cpr_format.is_position() && m.cpr.is_some())
            .collect();
        // Stable: equal timestamps keep arrival order
        frames.sort_by(|a, b| a.timestamp().total_cmp(&b.timestamp()));

        let mut matched = match self.strategy {
            PairingStrategy::NearestNeighbor => self.nearest_neighbor(&frames),
            PairingStrategy::Sequential => self.sequential(&frames),
        };
        matched.sort_by_key(|&(i, j)| (i.max(j), i.min(j)));

        matched
            .into_iter()
            .filter_map(|(i, j)| CprPair::new(frames[i], frames[j]).ok())
            .collect()
    }

    fn can_pair(&self, a: &ClassifiedMessage, b: &ClassifiedMessage) -> bool {
        a.identity() == b.identity()
            && a.cpr_format.opposite() == b.cpr_format
            && (b.timestamp() - a.timestamp()).abs() <= self.window
    }

    /// Greedy matching over candidate edges, shortest gap first. Ties go to
    /// the earlier frames.
    fn nearest_neighbor(&self, frames: &[&ClassifiedMessage]) -> Vec<(usize, usize)> {
        let mut edges: Vec<(f64, usize, usize)> = Vec::new();
        for i in 0..frames.len() {
            for j in (i + 1)..frames.len() {
                let gap = frames[j].timestamp() - frames[i].timestamp();
                if gap > self.window {
                    break;
                }
                if self.can_pair(frames[i], frames[j]) {
                    edges.push((gap, i, j));
                }
            }
        }
        edges.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

        let mut used = vec![false; frames.len()];
        let mut matched = Vec::new();
        for (_, i, j) in edges {
            if used[i] || used[j] {
                continue;
            }
            used[i] = true;
            used[j] = true;
            matched.push((i, j));
        }
        matched
    }

    /// Latest-even/latest-odd slots. Once both are held, the attempt
    /// clears both slots whether or not the frames fall inside the window.
    fn sequential(&self, frames: &[&ClassifiedMessage]) -> Vec<(usize, usize)> {
        let mut even: Option<usize> = None;
        let mut odd: Option<usize> = None;
        let mut matched = Vec::new();

        for (idx, frame) in frames.iter().enumerate() {
            match frame.cpr_format {
                CprFormat::Even => even = Some(idx),
                CprFormat::Odd => odd = Some(idx),
                CprFormat::NotApplicable => continue,
            }
            let (Some(e), Some(o)) = (even, odd) else {
                continue;
            };
            if self.can_pair(frames[e], frames[o]) {
                matched.push((e.min(o), e.max(o)));
            }
            even = None;
            odd = None;
        }
        matched
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
