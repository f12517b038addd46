//! adsbtrack-core: batch ADS-B position extraction.
//!
//! Beast-framed Mode S messages go in; geolocated aircraft positions come
//! out. Classification, CPR even/odd pairing, global decode and the
//! region filter are pure functions over an in-memory batch. The only I/O
//! is the YAML config file.

pub mod beast;
pub mod classify;
pub mod config;
pub mod cpr;
pub mod crc;
pub mod frame;
pub mod geo;
pub mod pairing;
pub mod pipeline;
pub mod types;

// Re-export commonly used types at crate root
pub use classify::{classify, group_by_identity, ClassifiedMessage, Classifier};
pub use config::Config;
pub use geo::{DistanceModel, GeoFilter, GeoPoint};
pub use pairing::{CprPair, PairingEngine, PairingStrategy};
pub use pipeline::{Pipeline, PipelineOutput, PipelineStats};
pub use types::*;
