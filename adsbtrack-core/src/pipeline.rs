//! Batch pipeline: classify → group → pair → decode → filter.
//!
//! Per-record failures are counted and skipped. Only empty input and
//! invalid configuration abort a run.

use std::thread;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::classify::{group_by_identity, ClassifiedMessage, Classifier};
use crate::config::Config;
use crate::cpr;
use crate::geo::GeoFilter;
use crate::pairing::PairingEngine;
use crate::types::{icao_to_string, AdsbError, FilteredPosition, Icao, Position, RawMessage, Result};

/// Aggregate counts for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub messages: usize,
    pub malformed: usize,
    pub duplicates: usize,
    pub identities: usize,
    pub cpr_messages: usize,
    pub pairs: usize,
    pub zone_mismatches: usize,
    pub decoded: usize,
    pub outside_region: usize,
}

/// Result of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub positions: Vec<FilteredPosition>,
    pub stats: PipelineStats,
}

/// Decoded positions and counters for one identity.
#[derive(Debug, Default)]
struct IdentityResult {
    positions: Vec<Position>,
    cpr_messages: usize,
    pairs: usize,
    zone_mismatches: usize,
}

/// A configured pipeline. Cheap to build; holds no state between runs.
#[derive(Debug, Clone, Copy)]
pub struct Pipeline {
    classifier: Classifier,
    engine: PairingEngine,
    filter: GeoFilter,
    dedup_window: f64,
    workers: usize,
}

impl Pipeline {
    /// Validate the configuration and build the stages.
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;
        Ok(Pipeline {
            classifier: Classifier::new(config.decode.require_crc),
            engine: config.pairing_engine(),
            filter: config.geo_filter()?,
            dedup_window: config.decode.dedup_window_seconds,
            workers: config.workers,
        })
    }

    pub fn filter(&self) -> &GeoFilter {
        &self.filter
    }

    /// Run the full pipeline over a loaded batch.
    pub fn run(&self, messages: &[RawMessage]) -> Result<PipelineOutput> {
        if messages.is_empty() {
            return Err(AdsbError::EmptyInput);
        }

        let mut stats = PipelineStats {
            messages: messages.len(),
            ..PipelineStats::default()
        };

        let mut classified = Vec::with_capacity(messages.len());
        for (index, raw) in messages.iter().enumerate() {
            match self.classifier.classify(raw) {
                Ok(msg) => classified.push(msg),
                Err(e) => {
                    debug!(index, receiver = %raw.receiver_id, error = %e, "skipping message");
                    stats.malformed += 1;
                }
            }
        }

        let (groups, duplicates) = group_by_identity(classified, self.dedup_window);
        stats.duplicates = duplicates;
        stats.identities = groups.len();

        let groups: Vec<(Icao, Vec<ClassifiedMessage>)> = groups.into_iter().collect();
        let results = if self.workers > 1 && groups.len() > 1 {
            self.process_parallel(&groups)
        } else {
            groups.iter().map(|(icao, msgs)| self.process_identity(icao, msgs)).collect()
        };

        let mut decoded = Vec::new();
        for result in results {
            stats.cpr_messages += result.cpr_messages;
            stats.pairs += result.pairs;
            stats.zone_mismatches += result.zone_mismatches;
            decoded.extend(result.positions);
        }
        stats.decoded = decoded.len();

        let positions = self.filter.filter(decoded);
        stats.outside_region = stats.decoded - positions.len();

        if stats.pairs == 0 {
            warn!(
                messages = stats.messages,
                cpr_messages = stats.cpr_messages,
                "no even/odd pairs found in input"
            );
        }
        info!(
            messages = stats.messages,
            malformed = stats.malformed,
            duplicates = stats.duplicates,
            identities = stats.identities,
            pairs = stats.pairs,
            zone_mismatches = stats.zone_mismatches,
            decoded = stats.decoded,
            kept = positions.len(),
            "pipeline complete"
        );

        Ok(PipelineOutput { positions, stats })
    }

    /// Pair and decode one identity's time-ordered messages.
    fn process_identity(&self, icao: &Icao, messages: &[ClassifiedMessage]) -> IdentityResult {
        let mut result = IdentityResult {
            cpr_messages: messages.iter().filter(|m| m.cpr.is_some()).count(),
            ..IdentityResult::default()
        };

        for pair in self.engine.pair(messages) {
            result.pairs += 1;
            match cpr::decode(&pair) {
                Ok(position) => result.positions.push(position),
                Err(e) => {
                    debug!(icao = %icao_to_string(icao), gap = pair.gap(), error = %e, "skipping pair");
                    result.zone_mismatches += 1;
                }
            }
        }
        result
    }

    /// Split identities into contiguous chunks, one scoped thread each.
    /// Chunks are joined in order so the output matches a sequential run.
    fn process_parallel(&self, groups: &[(Icao, Vec<ClassifiedMessage>)]) -> Vec<IdentityResult> {
        let chunk_size = groups.len().div_ceil(self.workers);
        thread::scope(|scope| {
            let handles: Vec<_> = groups
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move || {
                        chunk
                            .iter()
                            .map(|(icao, msgs)| self.process_identity(icao, msgs))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            let mut results = Vec::with_capacity(groups.len());
            for handle in handles {
                match handle.join() {
                    Ok(chunk) => results.extend(chunk),
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            }
            results
        })
    }
}

/// Run with the given configuration.
pub fn run(messages: &[RawMessage], config: &Config) -> Result<PipelineOutput> {
    Pipeline::new(config)?.run(messages)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beast::BeastFrame;
    use crate::frame::ModeFrame;
    use crate::types::{icao_from_hex, CprFormat};

    fn beast_position(icao: Icao, format: CprFormat, lat: f64, lon: f64, ts: f64, receiver: &str) -> RawMessage {
        let frame = ModeFrame::airborne_position(icao, 11, format, lat, lon);
        let bytes = BeastFrame::mode_s(&frame.raw, 0, 0x80).unwrap().to_bytes();
        RawMessage::new(bytes, ts, receiver)
    }

    fn a12345() -> Icao {
        icao_from_hex("A12345").unwrap()
    }

    #[test]
    fn test_end_to_end_single_aircraft() {
        let icao = a12345();
        let messages = vec![
            beast_position(icao, CprFormat::Even, 36.27, -95.78, 100.0, "r1"),
            beast_position(icao, CprFormat::Odd, 36.27, -95.78, 104.0, "r1"),
        ];

        let output = run(&messages, &Config::default()).unwrap();
        assert_eq!(output.positions.len(), 1);

        let p = &output.positions[0];
        assert_eq!(icao_to_string(&p.position.identity), "A12345");
        assert!((p.position.latitude - 36.27).abs() < 1e-4, "lat {}", p.position.latitude);
        assert!((p.position.longitude - -95.78).abs() < 1e-4, "lon {}", p.position.longitude);
        assert_eq!(p.position.timestamp, 104.0);
        assert!(p.distance_miles < 1.0);

        assert_eq!(output.stats.messages, 2);
        assert_eq!(output.stats.pairs, 1);
        assert_eq!(output.stats.decoded, 1);
        assert_eq!(output.stats.malformed, 0);
    }

    #[test]
    fn test_empty_input_is_fatal() {
        assert!(matches!(run(&[], &Config::default()), Err(AdsbError::EmptyInput)));
    }

    #[test]
    fn test_negative_radius_is_fatal() {
        let mut config = Config::default();
        config.region.radius_miles = -1.0;
        assert!(matches!(Pipeline::new(&config), Err(AdsbError::Config(_))));
    }

    #[test]
    fn test_malformed_messages_are_counted() {
        let icao = a12345();
        let messages = vec![
            RawMessage::new(vec![0x00, 0x01], 99.0, "r1"),
            beast_position(icao, CprFormat::Even, 36.27, -95.78, 100.0, "r1"),
            RawMessage::new(vec![0x1A, 0x31, 0, 0, 0, 0, 0, 0, 0, 0x12, 0x34], 101.0, "r1"),
            beast_position(icao, CprFormat::Odd, 36.27, -95.78, 104.0, "r1"),
        ];

        let output = run(&messages, &Config::default()).unwrap();
        assert_eq!(output.stats.malformed, 2);
        assert_eq!(output.positions.len(), 1);
    }

    #[test]
    fn test_only_malformed_input_yields_empty_result() {
        let messages = vec![RawMessage::new(vec![0xFF; 4], 0.0, "r1")];
        let output = run(&messages, &Config::default()).unwrap();
        assert!(output.positions.is_empty());
        assert_eq!(output.stats.malformed, 1);
        assert_eq!(output.stats.pairs, 0);
    }

    #[test]
    fn test_unpaired_messages_are_not_errors() {
        let icao = a12345();
        let messages = vec![
            beast_position(icao, CprFormat::Even, 36.27, -95.78, 100.0, "r1"),
            beast_position(icao, CprFormat::Odd, 36.27, -95.78, 130.0, "r1"),
        ];
        let output = run(&messages, &Config::default()).unwrap();
        assert!(output.positions.is_empty());
        assert_eq!(output.stats.cpr_messages, 2);
        assert_eq!(output.stats.pairs, 0);
        assert_eq!(output.stats.zone_mismatches, 0);
    }

    #[test]
    fn test_zone_mismatch_is_counted() {
        let icao = a12345();
        let messages = vec![
            beast_position(icao, CprFormat::Even, 36.27, -95.78, 100.0, "r1"),
            beast_position(icao, CprFormat::Odd, 41.0, -95.78, 104.0, "r1"),
        ];
        let output = run(&messages, &Config::default()).unwrap();
        assert_eq!(output.stats.pairs, 1);
        assert_eq!(output.stats.zone_mismatches, 1);
        assert!(output.positions.is_empty());
    }

    #[test]
    fn test_receiver_duplicates_are_dropped() {
        let icao = a12345();
        let messages = vec![
            beast_position(icao, CprFormat::Even, 36.27, -95.78, 100.0, "r1"),
            beast_position(icao, CprFormat::Even, 36.27, -95.78, 100.3, "r2"),
            beast_position(icao, CprFormat::Odd, 36.27, -95.78, 104.0, "r1"),
            beast_position(icao, CprFormat::Odd, 36.27, -95.78, 104.1, "r2"),
        ];
        let output = run(&messages, &Config::default()).unwrap();
        assert_eq!(output.stats.duplicates, 2);
        assert_eq!(output.stats.pairs, 1);
        assert_eq!(output.positions.len(), 1);
    }

    #[test]
    fn test_outside_region_is_counted() {
        let icao = a12345();
        let far = icao_from_hex("B00001").unwrap();
        let messages = vec![
            beast_position(icao, CprFormat::Even, 36.27, -95.78, 100.0, "r1"),
            beast_position(icao, CprFormat::Odd, 36.27, -95.78, 104.0, "r1"),
            beast_position(far, CprFormat::Even, 40.0, -90.0, 100.0, "r1"),
            beast_position(far, CprFormat::Odd, 40.0, -90.0, 102.0, "r1"),
        ];
        let output = run(&messages, &Config::default()).unwrap();
        assert_eq!(output.stats.identities, 2);
        assert_eq!(output.stats.decoded, 2);
        assert_eq!(output.stats.outside_region, 1);
        assert_eq!(output.positions.len(), 1);
        assert_eq!(output.positions[0].position.identity, icao);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let mut messages = Vec::new();
        for n in 0..12u32 {
            let icao = [0xAB, 0x00, n as u8 + 1];
            let lat = 36.0 + n as f64 * 0.05;
            let lon = -95.9 + n as f64 * 0.03;
            for k in 0..3 {
                let t = 100.0 + k as f64 * 10.0 + n as f64 * 0.1;
                messages.push(beast_position(icao, CprFormat::Even, lat, lon, t, "r1"));
                messages.push(beast_position(icao, CprFormat::Odd, lat, lon, t + 2.0, "r1"));
            }
        }

        let sequential = run(&messages, &Config::default()).unwrap();

        let mut config = Config::default();
        config.workers = 4;
        let parallel = run(&messages, &config).unwrap();

        assert_eq!(sequential.positions.len(), 36);
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn test_run_is_deterministic() {
        let icao = a12345();
        let messages = vec![
            beast_position(icao, CprFormat::Odd, 36.27, -95.78, 96.0, "r1"),
            beast_position(icao, CprFormat::Even, 36.27, -95.78, 100.0, "r1"),
            beast_position(icao, CprFormat::Odd, 36.28, -95.77, 104.0, "r1"),
        ];
        let first = run(&messages, &Config::default()).unwrap();
        let second = run(&messages, &Config::default()).unwrap();
        assert_eq!(first, second);
    }
}
