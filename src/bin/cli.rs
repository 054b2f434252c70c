use std::fmt::Write;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write as _};
use std::path::{Path, PathBuf, absolute};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use clap::builder::styling::Styles;
use clap::{Args, ColorChoice, Parser, Subcommand, ValueEnum, crate_version};
use clap_cargo::style::{ERROR, HEADER, INVALID, LITERAL, PLACEHOLDER, USAGE, VALID};
use fitstream::{
    DecodedPoint, ErrorKind, FitDecodeError, FitStreamError, HeaderError, TrimError, TrimLimit,
    TrimOptions, TrimReport,
};
use serde::Serialize;
use strum::Display;
use tracing::level_filters::LevelFilter;
use tracing::{Level, debug, enabled, error, info, instrument, warn};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{Layer, Registry, fmt};

pub const CLAP_STYLING: Styles = Styles::styled()
    .header(HEADER)
    .usage(USAGE)
    .literal(LITERAL)
    .placeholder(PLACEHOLDER)
    .error(ERROR)
    .valid(VALID)
    .invalid(INVALID);

static LONG_VERSION: LazyLock<String> =
    LazyLock::new(|| format!("{} (rustc {})", crate_version!(), env!("RUSTC_VERSION")));

/// Decode and trim Garmin FIT activity files
///
/// Validates FIT files recorded by GPS devices, prints the track points of
/// their record messages, and cuts them down to a valid prefix of their
/// messages.
#[derive(Parser)]
#[command(
    name = "fitstream",
    version,
    long_version = LONG_VERSION.as_str(),
    about,
    color = ColorChoice::Auto,
    styles = CLAP_STYLING,
)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,

    /// Configure diagnostic logging level
    ///
    /// Set to DEBUG to see a performance summary following execution, or to
    /// TRACE to log every message of the input.
    #[clap(long, short = 'L', default_value_t = Level::ERROR)]
    log_level: Level,

    /// Log to a file
    #[clap(long)]
    log_file: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, Display, ValueEnum)]
#[strum(serialize_all = "kebab-case")]
#[clap(rename_all = "kebab-case")]
enum DumpFormat {
    Text,
    Csv,
}

#[derive(Args, Debug)]
struct CheckArgs {
    /// FIT input path
    input: PathBuf,
}

#[derive(Args, Debug)]
struct DumpArgs {
    /// FIT input path
    input: PathBuf,

    /// Output format
    #[clap(long, short = 'F', default_value_t = DumpFormat::Text)]
    format: DumpFormat,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct LimitArgs {
    /// Keep the first N messages, definitions included
    #[clap(long, value_name = "N")]
    messages: Option<usize>,

    /// Keep as many whole messages as fit in N bytes
    #[clap(long, value_name = "N")]
    bytes: Option<usize>,

    /// Keep the first N track points
    #[clap(long, value_name = "N")]
    points: Option<usize>,
}

impl LimitArgs {
    fn limit(&self) -> TrimLimit {
        match (self.messages, self.bytes, self.points) {
            (Some(n), _, _) => TrimLimit::Messages(n),
            (_, Some(n), _) => TrimLimit::PayloadBytes(n),
            (_, _, Some(n)) => TrimLimit::Points(n),
            _ => TrimLimit::Unbounded,
        }
    }
}

#[derive(Args, Debug)]
struct TrimArgs {
    /// FIT input path
    input: PathBuf,

    /// FIT file output path
    ///
    /// If unspecified, defaults to <INPUT>.trim.fit in the same directory as
    /// the input file.
    #[clap(long, short)]
    output: Option<PathBuf>,

    /// Force overwriting the output file, if it already exists.
    #[clap(long, short, action)]
    force: bool,

    #[command(flatten)]
    limit: LimitArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a FIT file
    ///
    /// Checks the header and file CRCs and walks every message, then prints a
    /// count of the messages found.
    Check(CheckArgs),

    /// Print the track points of a FIT file
    Dump(DumpArgs),

    /// Write a copy of a FIT file keeping only its first messages
    ///
    /// Messages are copied byte for byte; the header and CRCs of the output
    /// are recomputed.
    Trim(TrimArgs),

    /// Print software license info
    License,
}

/// Attach a hint for the user to a library error.
fn explain<T>(res: fitstream::Result<T>) -> Result<T> {
    match &res {
        Err(FitStreamError::Decode(FitDecodeError::Header(HeaderError::Signature(_))))
        | Err(FitStreamError::Trim(TrimError::Decode(FitDecodeError::Header(
            HeaderError::Signature(_),
        )))) => res.context("The <INPUT> is not a FIT file."),

        Err(FitStreamError::Trim(TrimError::Io(_))) => res.context(concat!(
            "Writing the FIT output to the filesystem. Ensure the output path exists and ",
            "that you have access permissions to write there."
        )),

        Err(e) => match e.kind() {
            Some(ErrorKind::Structural) => res.context(
                "The <INPUT> is damaged or incomplete. Check that it was copied in full.",
            ),
            Some(ErrorKind::UnsupportedFeature) | Some(ErrorKind::UnknownSchema) => res.context(
                "The <INPUT> uses FIT features or messages that are not supported.",
            ),
            Some(ErrorKind::ProtocolDesync) => {
                res.context("The <INPUT> is not a consistent FIT record stream.")
            }
            None => res.map_err(anyhow::Error::from),
        },

        Ok(_) => res.map_err(anyhow::Error::from),
    }
}

fn open_input(input: &Path) -> Result<BufReader<File>> {
    let file = BufReader::new(
        File::open(input)
            .context("Opening the FIT <INPUT> file. Check that it exists and can be accessed.")?,
    );
    info!("Opened FIT input file: {:?}", absolute(input)?);
    Ok(file)
}

#[instrument(level = "trace", skip_all)]
fn check_cmd(sub_args: &CheckArgs) -> Result<String> {
    debug!("check args: {:?}", sub_args);

    let summary = explain(fitstream::check_file(open_input(&sub_args.input)?))?;
    let mut r = String::new();
    writeln!(
        &mut r,
        "Header: {} bytes, protocol {}, profile {}, {} data bytes",
        summary.header.header_len(),
        summary.header.protocol_version(),
        summary.header.profile_version(),
        summary.header.data_size()
    )?;
    writeln!(
        &mut r,
        "Messages: {} ({} track points)",
        summary.messages, summary.points
    )?;
    for (message, counts) in summary.sorted_counts() {
        writeln!(
            &mut r,
            "  {:<14} {:>3}  {:>6} definitions {:>8} data",
            message.to_string(),
            message.id(),
            counts.definitions,
            counts.data
        )?;
    }
    writeln!(&mut r, "OK")?;
    Ok(r)
}

fn opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

#[derive(Serialize)]
struct CsvRow {
    time: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    altitude_ft: Option<f64>,
    speed_mph: Option<f64>,
    distance_mi: Option<f64>,
    temperature_f: Option<f64>,
    heart_rate: Option<u8>,
    cadence: Option<u8>,
}

impl From<&DecodedPoint> for CsvRow {
    fn from(p: &DecodedPoint) -> Self {
        Self {
            time: p.timestamp.map(|t| t.to_string()),
            latitude: p.latitude.map(|v| v.0),
            longitude: p.longitude.map(|v| v.0),
            altitude_ft: p.altitude.map(|v| v.0),
            speed_mph: p.speed.map(|v| v.0),
            distance_mi: p.distance.map(|v| v.0),
            temperature_f: p.temperature.map(|v| v.0),
            heart_rate: p.heart_rate,
            cadence: p.cadence,
        }
    }
}

fn dump_text(points: &[DecodedPoint]) -> Result<String> {
    let mut r = String::new();
    for p in points {
        writeln!(
            &mut r,
            "{:<20} {:>12} {:>12} {:>11} {:>10} {:>10} {:>7} {:>4} {:>4}",
            opt(p.timestamp),
            opt(p.latitude.map(|v| format!("{:.6}", v.0))),
            opt(p.longitude.map(|v| format!("{:.6}", v.0))),
            opt(p.altitude.map(|v| format!("{:.1}ft", v.0))),
            opt(p.speed.map(|v| format!("{:.2}mph", v.0))),
            opt(p.distance.map(|v| format!("{:.3}mi", v.0))),
            opt(p.temperature.map(|v| format!("{:.0}°F", v.0))),
            opt(p.heart_rate),
            opt(p.cadence),
        )?;
    }
    Ok(r)
}

fn dump_csv(points: &[DecodedPoint]) -> Result<String> {
    let mut w = csv::Writer::from_writer(vec![]);
    for p in points {
        w.serialize(CsvRow::from(p))?;
    }
    let bytes = w.into_inner().context("Flushing CSV output")?;
    Ok(String::from_utf8(bytes)?)
}

#[instrument(level = "trace", skip_all)]
fn dump_cmd(sub_args: &DumpArgs) -> Result<String> {
    debug!("dump args: {:?}", sub_args);

    let points = explain(fitstream::decode_points(open_input(&sub_args.input)?))?;
    match sub_args.format {
        DumpFormat::Text => dump_text(&points),
        DumpFormat::Csv => dump_csv(&points),
    }
}

/// Trim `input` in memory, creating `output` only once the trim succeeded.
fn write_trimmed<R: Read + Seek>(
    input: R,
    output: &Path,
    force: bool,
    options: TrimOptions,
) -> Result<TrimReport> {
    let mut trimmed = vec![];
    let report = explain(fitstream::trim_file(input, &mut trimmed, options))?;

    let mut fit_file = BufWriter::new(
        if force {
            File::create(output)
        } else {
            File::create_new(output)
        }
        .context("Creating the <OUTPUT> file")?,
    );
    info!("Created FIT output file: {:?}", absolute(output)?);
    fit_file.write_all(&trimmed)?;
    fit_file.flush().context("Writing the <OUTPUT> file")?;
    Ok(report)
}

#[instrument(level = "trace", skip_all)]
fn trim_cmd(sub_args: &TrimArgs) -> Result<String> {
    debug!("trim args: {:?}", sub_args);

    let input = open_input(&sub_args.input)?;
    let output = match &sub_args.output {
        Some(p) => p,
        None => &sub_args.input.with_extension("trim.fit"),
    };

    if ((sub_args.force && enabled!(Level::WARN)) || (!sub_args.force && enabled!(Level::ERROR)))
        && output.exists()
    {
        if sub_args.force {
            warn!("Output file exists and will be overwritten: {:?}", output);
        } else {
            error!(
                "Output file already exists and may not be overwritten: {:?}",
                output
            );
        }
    }
    let options = TrimOptions::default().with_limit(sub_args.limit.limit());
    let report = write_trimmed(input, output, sub_args.force, options)?;

    let mut r = String::new();
    writeln!(
        &mut r,
        "Kept {} messages ({} track points, {} bytes), dropped {}",
        report.messages_kept, report.points_kept, report.bytes_kept, report.messages_dropped
    )?;
    writeln!(
        &mut r,
        "\nOutput is in {}",
        absolute(output)
            .unwrap_or(output.to_path_buf())
            .to_string_lossy()
    )?;
    Ok(r)
}

fn license_cmd() -> Result<String> {
    let mut r = include_str!("../../LICENSE.txt").to_string();
    writeln!(
        &mut r,
        r#"
===

This executable contains code from third-party open source projects under
their own licenses; run `cargo tree` on the fitstream {} sources to list them.
"#,
        crate_version!(),
    )?;
    Ok(r)
}

fn main() -> Result<()> {
    // Intentionally avoid wrapping argument parsing errors in anyhow::Result so
    // we preserve Clap's pretty formatting of usage info.
    let args = Cli::parse();

    let log_w: Box<dyn std::io::Write + Send> = match &args.log_file {
        Some(path) => Box::new(File::create(path).context("Creating the log file")?),
        None => Box::new(std::io::stderr()),
    };
    let (appender, _guard) = tracing_appender::non_blocking(log_w);

    // Enable the TRACE-level span tree layer for fmt logging level DEBUG.
    let fmt_layer = fmt::Layer::new()
        .with_writer(appender)
        .with_ansi(args.log_file.is_none())
        .with_target(false)
        .with_span_events(FmtSpan::ENTER | FmtSpan::CLOSE)
        .with_filter(LevelFilter::from_level(args.log_level));
    if args.log_level >= Level::DEBUG {
        let span_tree_layer = tracing_span_tree::SpanTree::default().aggregate(true);
        tracing::subscriber::set_global_default(
            Registry::default().with(fmt_layer).with(span_tree_layer),
        )?;
    } else {
        tracing::subscriber::set_global_default(Registry::default().with(fmt_layer))?;
    }

    debug!("fitstream {}", clap::crate_version!());

    let report = match &args.cmd {
        Commands::Check(sub_args) => check_cmd(sub_args),
        Commands::Dump(sub_args) => dump_cmd(sub_args),
        Commands::Trim(sub_args) => trim_cmd(sub_args),
        Commands::License => license_cmd(),
    }?;

    print!("{report}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io::Cursor;
    use std::path::PathBuf;

    use fitstream::testonly::{FitFileBuilder, TestPoint};
    use fitstream::{TrimLimit, TrimOptions};

    use super::{DumpArgs, DumpFormat, LimitArgs, dump_csv, opt, write_trimmed};

    fn scratch_path(name: &str) -> PathBuf {
        env::temp_dir().join(format!("fitstream_cli_{}_{}.fit", name, std::process::id()))
    }

    fn activity() -> anyhow::Result<Vec<u8>> {
        let mut builder = FitFileBuilder::new().start_activity();
        for i in 0..4 {
            builder = builder.add_point(&TestPoint::at_second(i));
        }
        Ok(builder.finish_activity().build()?)
    }

    #[test]
    fn test_failed_trim_creates_no_output() -> anyhow::Result<()> {
        let mut bytes = activity()?;
        bytes[30] ^= 0xff;
        let output = scratch_path("corrupt");
        let _ = fs::remove_file(&output);

        let options = TrimOptions::default().with_limit(TrimLimit::Points(1));
        assert!(write_trimmed(Cursor::new(bytes), &output, false, options).is_err());
        assert!(!output.exists());
        Ok(())
    }

    #[test]
    fn test_trim_writes_output() -> anyhow::Result<()> {
        let output = scratch_path("valid");
        let _ = fs::remove_file(&output);

        let options = TrimOptions::default().with_limit(TrimLimit::Points(2));
        let report = write_trimmed(Cursor::new(activity()?), &output, false, options)?;
        let written = fs::read(&output)?;
        assert_eq!(fitstream::decode_points(Cursor::new(&written))?.len(), 2);
        assert_eq!(report.points_kept, 2);

        // Without --force the existing output is left alone.
        let again = write_trimmed(
            Cursor::new(activity()?),
            &output,
            false,
            TrimOptions::default(),
        );
        assert!(again.is_err());
        assert_eq!(fs::read(&output)?, written);

        write_trimmed(Cursor::new(activity()?), &output, true, TrimOptions::default())?;
        assert_eq!(fitstream::decode_points(Cursor::new(fs::read(&output)?))?.len(), 4);
        fs::remove_file(&output)?;
        Ok(())
    }

    #[test]
    fn test_limit_args() {
        let args = LimitArgs {
            messages: None,
            bytes: None,
            points: Some(3),
        };
        assert_eq!(args.limit(), TrimLimit::Points(3));
    }

    #[test]
    fn test_dump_args_debug() {
        let args = DumpArgs {
            input: PathBuf::from("activity.fit"),
            format: DumpFormat::Csv,
        };
        assert!(format!("{args:?}").contains("format: Csv"));
        assert_eq!(DumpFormat::Csv.to_string(), "csv");
    }

    #[test]
    fn test_opt() {
        assert_eq!(opt(Some(3)), "3");
        assert_eq!(opt(None::<u8>), "-");
    }

    #[test]
    fn test_dump_csv_header() -> anyhow::Result<()> {
        let out = dump_csv(&[Default::default()])?;
        assert!(out.starts_with("time,latitude,longitude,altitude_ft,"));
        assert_eq!(out.lines().count(), 2);
        Ok(())
    }
}
