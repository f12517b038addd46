//! adsbtrack: decode Beast captures into aircraft positions near a point.

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use comfy_table::{Cell, Table};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use adsbtrack_core::beast::BeastFrame;
use adsbtrack_core::config::{self, Config};
use adsbtrack_core::frame::ModeFrame;
use adsbtrack_core::pipeline::{Pipeline, PipelineOutput};
use adsbtrack_core::types::*;
use adsbtrack_core::{DistanceModel, PairingStrategy};

#[derive(Parser)]
#[command(name = "adsbtrack", version, about = "ADS-B position extraction from Beast captures")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a capture file and print positions inside the region
    Positions {
        /// File of `beast_hex;timestamp[;receiver]` lines, or `-` for stdin
        file: PathBuf,

        /// Emit JSON lines instead of a table
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Print an even and an odd Beast line for a position
    Encode {
        /// Aircraft address, 6 hex digits
        #[arg(long)]
        icao: String,

        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Timestamp of the even frame, Unix seconds
        #[arg(long, default_value = "0.0")]
        time: f64,

        /// Seconds between the even and the odd frame
        #[arg(long, default_value = "4.0")]
        gap: f64,

        /// ADS-B type code (9-18 barometric, 20-22 GNSS)
        #[arg(long, default_value = "11")]
        type_code: u8,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write the default configuration
    Init {
        /// Target path (default: ~/.adsbtrack/config.yaml)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration
    Show {
        #[arg(long, env = "ADSBTRACK_CONFIG")]
        config: Option<PathBuf>,
    },
}

/// Command-line values layered over the config file.
#[derive(clap::Args)]
struct Overrides {
    /// Config file (default: ~/.adsbtrack/config.yaml)
    #[arg(long, env = "ADSBTRACK_CONFIG")]
    config: Option<PathBuf>,

    /// Region radius in miles
    #[arg(long)]
    radius: Option<f64>,

    #[arg(long, allow_hyphen_values = true)]
    center_lat: Option<f64>,

    #[arg(long, allow_hyphen_values = true)]
    center_lon: Option<f64>,

    /// Pairing window in seconds
    #[arg(long)]
    window: Option<f64>,

    /// nearest_neighbor or sequential
    #[arg(long)]
    strategy: Option<PairingStrategy>,

    /// haversine or flat_earth
    #[arg(long)]
    distance: Option<DistanceModel>,

    #[arg(long)]
    workers: Option<usize>,

    /// Drop frames that fail CRC
    #[arg(long)]
    require_crc: bool,
}

impl Overrides {
    fn apply(&self, config: &mut Config) {
        if let Some(radius) = self.radius {
            config.region.radius_miles = radius;
        }
        if let Some(lat) = self.center_lat {
            config.region.center_lat = lat;
        }
        if let Some(lon) = self.center_lon {
            config.region.center_lon = lon;
        }
        if let Some(window) = self.window {
            config.pairing.window_seconds = window;
        }
        if let Some(strategy) = self.strategy {
            config.pairing.strategy = strategy;
        }
        if let Some(distance) = self.distance {
            config.region.distance = distance;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if self.require_crc {
            config.decode.require_crc = true;
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Positions {
            file,
            json,
            overrides,
        } => cmd_positions(&file, json, &overrides),
        Commands::Encode {
            icao,
            lat,
            lon,
            time,
            gap,
            type_code,
        } => cmd_encode(&icao, lat, lon, time, gap, type_code),
        Commands::Config { action } => match action {
            ConfigAction::Init { path, force } => cmd_config_init(path, force),
            ConfigAction::Show { config } => cmd_config_show(config.as_deref()),
        },
    }
}

fn load_effective_config(path: Option<&Path>) -> Config {
    let result = match path {
        Some(p) => config::load_config_from(p),
        None => config::load_config(),
    };
    result.unwrap_or_else(|e| {
        eprintln!("Error loading config: {e}");
        std::process::exit(1);
    })
}

fn cmd_positions(file: &Path, json: bool, overrides: &Overrides) {
    let mut config = load_effective_config(overrides.config.as_deref());
    overrides.apply(&mut config);

    let pipeline = Pipeline::new(&config).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    let reader: Box<dyn BufRead> = if file.to_str() == Some("-") {
        Box::new(io::stdin().lock())
    } else {
        let f = std::fs::File::open(file).unwrap_or_else(|e| {
            eprintln!("Error opening {}: {e}", file.display());
            std::process::exit(1);
        });
        Box::new(io::BufReader::new(f))
    };

    let (messages, bad_lines) = load_messages(reader);
    if bad_lines > 0 {
        warn!(bad_lines, "skipped unparsable input lines");
    }
    let output = pipeline.run(&messages).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    if json {
        for p in &output.positions {
            match serde_json::to_string(p) {
                Ok(line) => println!("{line}"),
                Err(e) => {
                    eprintln!("Error encoding position: {e}");
                    std::process::exit(1);
                }
            }
        }
    } else {
        print_positions(&output);
    }
    print_summary(file, &output, bad_lines, &pipeline);
}

/// Parse `beast_hex;timestamp[;receiver]` lines. Returns the messages and
/// the number of unparsable lines.
fn load_messages(reader: impl BufRead) -> (Vec<RawMessage>, usize) {
    let mut messages = Vec::new();
    let mut bad_lines = 0;

    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => {
                bad_lines += 1;
                continue;
            }
        };

        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        match parse_line(line) {
            Some(msg) => messages.push(msg),
            None => bad_lines += 1,
        }
    }

    (messages, bad_lines)
}

fn parse_line(line: &str) -> Option<RawMessage> {
    let mut fields = line.split(';').map(str::trim);
    let bytes = hex_decode(fields.next()?)?;
    let timestamp = fields.next()?.parse::<f64>().ok().filter(|t| t.is_finite())?;
    let receiver = fields.next().filter(|r| !r.is_empty()).unwrap_or("-");
    Some(RawMessage::new(bytes, timestamp, receiver))
}

fn print_positions(output: &PipelineOutput) {
    if output.positions.is_empty() {
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["ICAO", "Time", "Lat", "Lon", "Dist (mi)"]);

    for p in &output.positions {
        table.add_row(vec![
            Cell::new(icao_to_string(&p.position.identity)),
            Cell::new(format!("{:.3}", p.position.timestamp)),
            Cell::new(format!("{:.6}", p.position.latitude)),
            Cell::new(format!("{:.6}", p.position.longitude)),
            Cell::new(format!("{:.2}", p.distance_miles)),
        ]);
    }

    println!("{table}");
}

fn print_summary(file: &Path, output: &PipelineOutput, bad_lines: usize, pipeline: &Pipeline) {
    let stats = &output.stats;
    let filter = pipeline.filter();
    let center = filter.center();
    let extent = filter.extent();

    eprintln!();
    eprintln!("Positions: {}", file.display());
    eprintln!(
        "  Lines:     {} messages, {} unparsable",
        stats.messages, bad_lines
    );
    eprintln!(
        "  Messages:  {} malformed, {} duplicates, {} with CPR",
        stats.malformed, stats.duplicates, stats.cpr_messages
    );
    eprintln!(
        "  Pairs:     {} found, {} zone mismatches, {} decoded",
        stats.pairs, stats.zone_mismatches, stats.decoded
    );
    eprintln!(
        "  Region:    {} within {:.1} mi of ({:.4}, {:.4}), {} outside",
        output.positions.len(),
        filter.radius_miles(),
        center.lat,
        center.lon,
        stats.outside_region
    );
    eprintln!("  Aircraft:  {}", stats.identities);
    eprintln!(
        "  Extent:    lon [{:.4}, {:.4}]  lat [{:.4}, {:.4}]",
        extent.lon_min, extent.lon_max, extent.lat_min, extent.lat_max
    );
}

fn cmd_encode(icao: &str, lat: f64, lon: f64, time: f64, gap: f64, type_code: u8) {
    let Some(address) = icao_from_hex(icao) else {
        eprintln!("Error: invalid ICAO address {icao:?}");
        std::process::exit(1);
    };
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        eprintln!("Error: position ({lat}, {lon}) out of range");
        std::process::exit(1);
    }
    if !adsbtrack_core::frame::is_position_type_code(type_code) {
        eprintln!("Error: type code {type_code} is not an airborne position");
        std::process::exit(1);
    }

    for (format, ts) in [(CprFormat::Even, time), (CprFormat::Odd, time + gap)] {
        let frame = ModeFrame::airborne_position(address, type_code, format, lat, lon);
        match BeastFrame::mode_s(&frame.raw, 0, 0xFF) {
            Ok(beast) => println!("{};{ts}", hex_encode(&beast.to_bytes())),
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
    }
}

fn cmd_config_init(path: Option<PathBuf>, force: bool) {
    let path = path.unwrap_or_else(config::config_file);
    if path.exists() && !force {
        eprintln!("{} already exists (use --force to overwrite)", path.display());
        std::process::exit(1);
    }
    if let Err(e) = config::save_config_to(&Config::default(), &path) {
        eprintln!("Error writing {}: {e}", path.display());
        std::process::exit(1);
    }
    println!("Wrote {}", path.display());
}

fn cmd_config_show(path: Option<&Path>) {
    let config = load_effective_config(path);
    match serde_yaml::to_string(&config) {
        Ok(text) => print!("{text}"),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        let msg = parse_line("1A33000000000000FF8DA1234558C382D690C8AC2863A7;104.5;rx7").unwrap();
        assert_eq!(msg.timestamp, 104.5);
        assert_eq!(msg.receiver_id, "rx7");
        assert_eq!(msg.bytes.len(), 23);

        let msg = parse_line("1A3300;7").unwrap();
        assert_eq!(msg.receiver_id, "-");
    }

    #[test]
    fn test_parse_line_rejects_garbage() {
        assert!(parse_line("zz;1.0").is_none());
        assert!(parse_line("1A33").is_none());
        assert!(parse_line("1A33;later").is_none());
        assert!(parse_line("1A33;NaN").is_none());
    }

    #[test]
    fn test_load_messages_skips_comments() {
        let input = "# capture\n\n1A33;1.0\nnot hex;2.0\n1A32 ; 3.0 ; r2\n";
        let (messages, bad) = load_messages(input.as_bytes());
        assert_eq!(messages.len(), 2);
        assert_eq!(bad, 1);
        assert_eq!(messages[1].receiver_id, "r2");
    }

    #[test]
    fn test_encoded_lines_decode_end_to_end() {
        let icao = icao_from_hex("A12345").unwrap();
        let lines: Vec<String> = [(CprFormat::Even, 100.0), (CprFormat::Odd, 104.0)]
            .into_iter()
            .map(|(format, ts)| {
                let frame = ModeFrame::airborne_position(icao, 11, format, 36.27, -95.78);
                let beast = BeastFrame::mode_s(&frame.raw, 0, 0xFF).unwrap();
                format!("{};{ts}", hex_encode(&beast.to_bytes()))
            })
            .collect();

        let (messages, bad) = load_messages(lines.join("\n").as_bytes());
        assert_eq!(bad, 0);

        let output = Pipeline::new(&Config::default()).unwrap().run(&messages).unwrap();
        assert_eq!(output.positions.len(), 1);
        assert!((output.positions[0].position.latitude - 36.27).abs() < 1e-4);
    }
}
