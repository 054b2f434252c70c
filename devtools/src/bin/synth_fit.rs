use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Deserialize;

use fitstream::testonly::{FitFileBuilder, TestPoint, degrees_to_semicircles};
use fitstream::{Architecture, GARMIN_EPOCH_OFFSET};

/// Writes a synthetic FIT activity file
///
/// Produces a file ID message, one record message per point of the JSON spec
/// at one second intervals, and a closing timer event.
#[derive(Parser)]
struct Args {
    /// Path to the JSON activity spec file
    #[clap(long)]
    spec: PathBuf,

    /// FIT file output path
    #[clap(long)]
    out: PathBuf,

    /// Encode multi-byte fields big-endian
    #[clap(long)]
    big_endian: bool,
}

#[derive(Deserialize)]
struct JsonPoint {
    lat: f64,
    lon: f64,

    #[serde(default)]
    altitude_m: f64,

    #[serde(default)]
    speed_mps: f64,

    #[serde(default)]
    distance_m: f64,

    #[serde(default = "default_heart_rate")]
    heart_rate: u8,

    #[serde(default = "default_temperature")]
    temperature_c: i8,
}

fn default_heart_rate() -> u8 {
    0xFF
}

fn default_temperature() -> i8 {
    0x7F
}

#[derive(Deserialize)]
struct ActivitySpec {
    /// Start timestamp in RFC3339 format.
    start_time: String,

    /// Ordered points of the activity, one second apart.
    points: Vec<JsonPoint>,
}

fn parse_rfc3339_utc(s: &str) -> Result<DateTime<Utc>> {
    let ts = DateTime::parse_from_rfc3339(s)?;
    Ok(ts.with_timezone(&Utc))
}

fn fit_timestamp(t: DateTime<Utc>) -> Result<u32> {
    let secs = t.timestamp() - GARMIN_EPOCH_OFFSET;
    if secs < 0 {
        bail!("Start time precedes the FIT epoch");
    }
    Ok(u32::try_from(secs)?)
}

fn to_test_point(start: u32, i: usize, p: &JsonPoint) -> Result<TestPoint> {
    Ok(TestPoint {
        timestamp: start + u32::try_from(i)?,
        latitude: degrees_to_semicircles(p.lat),
        longitude: degrees_to_semicircles(p.lon),
        altitude: ((p.altitude_m + 500.0) * 5.0).round() as u16,
        distance: (p.distance_m * 100.0).round() as u32,
        speed: (p.speed_mps * 1000.0).round() as u16,
        heart_rate: p.heart_rate,
        temperature: p.temperature_c,
    })
}

fn write_fit(args: Args) -> Result<()> {
    let spec_file = File::open(&args.spec)?;
    let spec: ActivitySpec = serde_json::from_reader(spec_file)?;
    let start = fit_timestamp(parse_rfc3339_utc(&spec.start_time)?)?;

    let arch = if args.big_endian {
        Architecture::BigEndian
    } else {
        Architecture::LittleEndian
    };
    let mut builder = FitFileBuilder::new().with_architecture(arch).start_activity();
    for (i, point) in spec.points.iter().enumerate() {
        builder = builder.add_point(&to_test_point(start, i, point)?);
    }

    let mut fit_file = File::create(&args.out)?;
    fit_file.write_all(&builder.finish_activity().build()?)?;
    Ok(())
}

fn main() -> Result<()> {
    write_fit(Args::parse())
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::prelude::*;

    use super::{fit_timestamp, parse_rfc3339_utc};

    #[test]
    fn test_parse_rfc3339_utc() -> Result<()> {
        let ts = parse_rfc3339_utc("2023-07-14T12:00:00Z")?;
        assert_eq!(ts, Utc.with_ymd_and_hms(2023, 7, 14, 12, 0, 0).unwrap());
        assert_eq!(fit_timestamp(ts)?, 1_058_270_400);
        Ok(())
    }

    #[test]
    fn test_before_epoch() -> Result<()> {
        assert!(fit_timestamp(parse_rfc3339_utc("1980-01-01T00:00:00Z")?).is_err());
        Ok(())
    }
}
