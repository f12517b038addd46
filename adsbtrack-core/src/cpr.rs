//! Compact Position Reporting: global CPR decode for ADS-B positions.
//!
//! A position is resolved from an even/odd frame pair; no reference
//! position is needed.
//!
//! Key constants:
//! - NZ = 15 (latitude zones per hemisphere for even frames)
//! - Nb = 17 (bits per coordinate)
//! - Dlat_even = 360 / (4 * NZ) = 6.0 degrees
//! - Dlat_odd = 360 / (4 * NZ - 1) ≈ 6.1017 degrees

use crate::pairing::CprPair;
use crate::types::{AdsbError, CprCoords, CprFormat, Position, Result};

/// Number of latitude zones per hemisphere.
const NZ: f64 = 15.0;

/// Bits per CPR coordinate.
const NB: u32 = 17;

/// Maximum CPR value (2^17 = 131072).
const CPR_MAX: f64 = (1u32 << NB) as f64;

/// Standard CPR validity interval between even and odd frames (seconds).
pub const MAX_PAIR_AGE: f64 = 10.0;

/// Latitude beyond which a single longitude zone remains.
const POLAR_LAT: f64 = 87.0;

/// Number of longitude zones at a given latitude (NL function).
///
/// Ranges from 1 near poles to 59 at equator. Exactly ±87° has two zones.
pub fn nl(lat: f64) -> i32 {
    let abs = lat.abs();
    if abs > POLAR_LAT {
        return 1;
    }
    if abs == POLAR_LAT {
        return 2;
    }

    let a = 1.0 - (std::f64::consts::PI / (2.0 * NZ)).cos();
    let b = (std::f64::consts::PI / 180.0 * lat.abs()).cos().powi(2);
    let nl_val = (2.0 * std::f64::consts::PI / (1.0 - a / b).acos()).floor() as i32;
    nl_val.max(1)
}

/// Modulo that always returns a non-negative result.
fn modulo(x: f64, y: f64) -> f64 {
    x - y * (x / y).floor()
}

fn lat_zone_size(format: CprFormat) -> f64 {
    match format {
        CprFormat::Odd => 360.0 / (4.0 * NZ - 1.0),
        _ => 360.0 / (4.0 * NZ),
    }
}

/// Encode a position into 17-bit airborne CPR fields.
///
/// `NotApplicable` encodes as even.
pub fn encode(lat: f64, lon: f64, format: CprFormat) -> CprCoords {
    let i = if format == CprFormat::Odd { 1 } else { 0 };
    let dlat = lat_zone_size(format);

    let yz = (CPR_MAX * modulo(lat, dlat) / dlat + 0.5).floor();
    let rlat = dlat * (yz / CPR_MAX + (lat / dlat).floor());

    let n_lon = (nl(rlat) - i).max(1);
    let dlon = 360.0 / n_lon as f64;
    let xz = (CPR_MAX * modulo(lon, dlon) / dlon + 0.5).floor();

    CprCoords {
        lat: (yz as i64).rem_euclid(1 << NB) as u32,
        lon: (xz as i64).rem_euclid(1 << NB) as u32,
    }
}

/// Global CPR decode from an even/odd frame pair.
///
/// Returns `(latitude, longitude)` in degrees from the more recent frame.
/// Fails with `ZoneMismatch` when the two frames resolve to different
/// longitude-zone bands or to no valid latitude at all.
pub fn global_decode(even: CprCoords, odd: CprCoords, t_even: f64, t_odd: f64) -> Result<(f64, f64)> {
    let dlat_even = lat_zone_size(CprFormat::Even);
    let dlat_odd = lat_zone_size(CprFormat::Odd);

    let lat_even_cpr = even.lat as f64 / CPR_MAX;
    let lon_even_cpr = even.lon as f64 / CPR_MAX;
    let lat_odd_cpr = odd.lat as f64 / CPR_MAX;
    let lon_odd_cpr = odd.lon as f64 / CPR_MAX;

    // Latitude zone index j
    let j = (59.0 * lat_even_cpr - 60.0 * lat_odd_cpr + 0.5).floor();

    let mut lat_e = dlat_even * (modulo(j, 60.0) + lat_even_cpr);
    let mut lat_o = dlat_odd * (modulo(j, 59.0) + lat_odd_cpr);

    // Southern hemisphere
    if lat_e >= 270.0 {
        lat_e -= 360.0;
    }
    if lat_o >= 270.0 {
        lat_o -= 360.0;
    }

    if !(-90.0..=90.0).contains(&lat_e)
        || !(-90.0..=90.0).contains(&lat_o)
        || nl(lat_e) != nl(lat_o)
    {
        return Err(AdsbError::ZoneMismatch {
            lat_even: lat_e,
            lat_odd: lat_o,
        });
    }

    // NL is 1 above 87°, which leaves a single zone for both frames
    let nl_val = nl(lat_e);
    let m = (lon_even_cpr * (nl_val - 1) as f64 - lon_odd_cpr * nl_val as f64 + 0.5).floor();

    let (lat, lon) = if t_even >= t_odd {
        let n_lon = nl_val.max(1) as f64;
        (lat_e, (360.0 / n_lon) * (modulo(m, n_lon) + lon_even_cpr))
    } else {
        let n_lon = (nl_val - 1).max(1) as f64;
        (lat_o, (360.0 / n_lon) * (modulo(m, n_lon) + lon_odd_cpr))
    };

    Ok((round6(lat), normalize_lon(round6(lon))))
}

/// Fold a longitude into (-180, 180].
fn normalize_lon(lon: f64) -> f64 {
    let lon = modulo(lon, 360.0);
    if lon > 180.0 {
        lon - 360.0
    } else {
        lon
    }
}

/// Decode a matched pair into a position stamped with the later timestamp.
pub fn decode(pair: &CprPair<'_>) -> Result<Position> {
    let (t_even, t_odd) = (pair.even().raw.timestamp, pair.odd().raw.timestamp);
    let (latitude, longitude) = global_decode(pair.even_coords(), pair.odd_coords(), t_even, t_odd)?;

    Ok(Position {
        identity: pair.identity(),
        latitude,
        longitude,
        timestamp: t_even.max(t_odd),
    })
}

/// Round to 6 decimal places.
fn round6(val: f64) -> f64 {
    (val * 1_000_000.0).round() / 1_000_000.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn coords(lat: u32, lon: u32) -> CprCoords {
        CprCoords { lat, lon }
    }

    fn roundtrip(lat: f64, lon: f64, t_even: f64, t_odd: f64) -> (f64, f64) {
        let even = encode(lat, lon, CprFormat::Even);
        let odd = encode(lat, lon, CprFormat::Odd);
        global_decode(even, odd, t_even, t_odd).expect("consistent pair decodes")
    }

    #[test]
    fn test_nl_equator() {
        assert_eq!(nl(0.0), 59);
    }

    #[test]
    fn test_nl_poles() {
        assert_eq!(nl(87.0), 2);
        assert_eq!(nl(-87.0), 2);
        assert_eq!(nl(87.000001), 1);
        assert_eq!(nl(90.0), 1);
        assert_eq!(nl(86.99), 2);
    }

    #[test]
    fn test_decode_at_87_degrees() {
        // Even latitude lands exactly on 6 * (14 + 0.5)
        let (lat, lon) = global_decode(coords(65536, 32768), coords(33860, 16384), 1.0, 0.0).unwrap();
        assert_eq!(lat, 87.0);
        assert!((lon - 45.0).abs() < 1e-4, "lon {lon}");

        for (t_even, t_odd) in [(1.0, 0.0), (0.0, 1.0)] {
            let (dlat, dlon) = roundtrip(87.0, 45.0, t_even, t_odd);
            assert!((dlat - 87.0).abs() <= 1e-4, "lat decoded as {dlat}");
            assert!((dlon - 45.0).abs() < 0.01, "lon decoded as {dlon}");
        }
    }

    #[test]
    fn test_longitude_stays_in_range_after_rounding() {
        // Just above -180 rounds to -180 and must fold to 180
        assert_eq!(normalize_lon(round6(-179.99999999)), 180.0);
        assert_eq!(normalize_lon(round6(180.0000000001)), 180.0);
    }

    #[test]
    fn test_nl_boundary() {
        // The 59 → 58 transition sits at ~10.4705°
        assert_eq!(nl(10.46), 59);
        assert_eq!(nl(10.48), 58);
    }

    #[test]
    fn test_global_decode_known_pair() {
        // Test vectors from "The 1090MHz Riddle"
        let (lat, lon) = global_decode(coords(93000, 51372), coords(74158, 50194), 1.0, 0.0).unwrap();
        assert!((lat - 52.2572).abs() < 0.001, "Latitude should be ~52.2572, got {lat}");
        assert!((lon - 3.9194).abs() < 0.001, "Longitude should be ~3.9194, got {lon}");
    }

    #[test]
    fn test_encode_matches_known_even_frame() {
        assert_eq!(encode(52.2572, 3.9194, CprFormat::Even), coords(93000, 51372));
    }

    #[test]
    fn test_roundtrip_reference_points() {
        let points = [
            (36.27, -95.78),
            (52.2572, 3.9194),
            (-33.9, 151.2),
            (0.0, 179.9),
            (-45.5, -170.25),
        ];
        for (lat, lon) in points {
            for (t_even, t_odd) in [(1.0, 0.0), (0.0, 1.0)] {
                let (dlat, dlon) = roundtrip(lat, lon, t_even, t_odd);
                assert!((dlat - lat).abs() <= 1e-4, "lat {lat} decoded as {dlat}");
                assert!((dlon - lon).abs() <= 1e-4, "lon {lon} decoded as {dlon}");
            }
        }
    }

    #[test]
    fn test_polar_pair_single_zone() {
        for (lat, lon) in [(88.5, 45.0), (89.2, -120.3), (-87.5, 10.0)] {
            let (dlat, dlon) = roundtrip(lat, lon, 1.0, 0.0);
            assert!(dlat.abs() > 87.0);
            assert!(dlon.is_finite());
            assert!((dlat - lat).abs() <= 1e-4, "lat {lat} decoded as {dlat}");
            // One longitude zone spans 360°, so the 17-bit resolution is ~0.003°
            assert!((dlon - lon).abs() < 0.01, "lon {lon} decoded as {dlon}");
        }
    }

    #[test]
    fn test_zone_boundary_crossing_fails() {
        // Even frame just south of the NL 59/58 boundary, odd just north
        let even = encode(10.46, 20.0, CprFormat::Even);
        let odd = encode(10.48, 20.0, CprFormat::Odd);
        let result = global_decode(even, odd, 0.0, 1.0);
        assert!(matches!(result, Err(AdsbError::ZoneMismatch { .. })));
    }

    #[test]
    fn test_inconsistent_pair_fails() {
        // Frames nearly five degrees apart resolve to a latitude beyond 90°
        let even = encode(36.27, -95.78, CprFormat::Even);
        let odd = encode(41.0, -95.78, CprFormat::Odd);
        let result = global_decode(even, odd, 0.0, 4.0);
        assert!(matches!(result, Err(AdsbError::ZoneMismatch { .. })));
    }

    #[test]
    fn test_decode_is_deterministic() {
        let first = global_decode(coords(93000, 51372), coords(74158, 50194), 1.0, 0.0).unwrap();
        for _ in 0..10 {
            let again = global_decode(coords(93000, 51372), coords(74158, 50194), 1.0, 0.0).unwrap();
            assert_eq!(first, again);
        }
    }

    #[test]
    fn test_normalize_lon() {
        assert_eq!(normalize_lon(180.0), 180.0);
        assert_eq!(normalize_lon(360.0), 0.0);
        assert!((normalize_lon(264.22) - -95.78).abs() < 1e-9);
        assert!((normalize_lon(-180.0) - 180.0).abs() < 1e-9);
    }

    #[test]
    fn test_modulo_negative() {
        assert!((modulo(-1.0, 60.0) - 59.0).abs() < 1e-10);
        assert!((modulo(7.0, 3.0) - 1.0).abs() < 1e-10);
    }
}
