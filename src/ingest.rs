use log::{debug, info, warn};

use snafu::{prelude::*, Snafu};

use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::{Args, Command, SourceArgs};

pub mod config_reader;
pub mod io_common;
mod io_csv;
mod io_xlsx;
pub mod pipeline;
pub mod sink;
pub mod store;
pub mod summary;

use config_reader::*;
use io_common::{ColumnMap, SourceRows};
use pipeline::BatchContext;
pub use sink::IngestMode;
use store::{SqliteVoterStore, StoreError, VoterStore, WipeReport};
use summary::BatchSummary;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum IngestError {
    #[snafu(display("Input file {path} does not exist"))]
    MissingFile { path: String },
    #[snafu(display("Cannot read {path}: only .xlsx and .csv files are supported"))]
    UnsupportedFormat { path: String },
    #[snafu(display("Error opening file {path}: {source}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("Workbook {path} has no worksheet {name:?}"))]
    MissingWorksheet { path: String, name: String },
    #[snafu(display("Workbook {path} has no worksheet"))]
    EmptyExcel { path: String },
    #[snafu(display("Error opening file {path}: {source}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("{path} has no header row"))]
    EmptySource { path: String },
    #[snafu(display("Missing required columns: {columns}"))]
    MissingColumns { columns: String },
    #[snafu(display("Error reading {path}: {source}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing {path}: {source}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Invalid date {value:?}, expected YYYY-MM-DD: {source}"))]
    InvalidDate {
        source: chrono::ParseError,
        value: String,
    },
    #[snafu(display("Voter store error: {source}"))]
    Store { source: StoreError },
    #[snafu(display("The zone table is empty, load it first with seed-zones"))]
    EmptyZoneTable {},
    #[snafu(display("Error serializing the summary: {source}"))]
    SerializingSummary { source: serde_json::Error },
    #[snafu(display("Error writing the summary to {path}: {source}"))]
    WritingSummary {
        source: std::io::Error,
        path: String,
    },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type IngestResult<T> = Result<T, IngestError>;

/// Everything needed to run one batch over one source file.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct IngestOptions {
    pub file: String,
    pub mode: IngestMode,
    pub sheet: Option<String>,
    pub today: NaiveDate,
    pub batch_size: Option<usize>,
}

impl IngestOptions {
    fn from_args(source: &SourceArgs, mode: IngestMode, config: &IngestConfig) -> IngestResult<Self> {
        let today = match &source.today {
            Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .context(InvalidDateSnafu { value: s.clone() })?,
            None => chrono::Local::now().date_naive(),
        };
        Ok(IngestOptions {
            file: source
                .file
                .clone()
                .unwrap_or_else(|| config.default_input_file.clone()),
            mode,
            sheet: source.sheet.clone(),
            today,
            batch_size: source.batch_size,
        })
    }
}

/// Opens a source file, choosing the reader from the file extension.
pub fn read_source(path: &str, sheet: Option<&str>, config: &IngestConfig) -> IngestResult<SourceRows> {
    ensure!(Path::new(path).is_file(), MissingFileSnafu { path });
    let extension = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    info!("Attempting to read voter roll {:?}", path);
    match extension.as_deref() {
        Some("xlsx") | Some("xlsm") => {
            io_xlsx::read_xlsx_roll(path, sheet, &config.preferred_worksheet)
        }
        Some("csv") => io_csv::read_csv_roll(path),
        _ => UnsupportedFormatSnafu { path }.fail(),
    }
}

fn load_zone_lookup(store: &dyn VoterStore) -> IngestResult<voter_zones::ZoneLookup> {
    let zones = store.load_zones().context(StoreSnafu {})?;
    ensure!(!zones.is_empty(), EmptyZoneTableSnafu {});
    let lookup = voter_zones::ZoneLookup::from_records(&zones);
    info!("Loaded {} zones", lookup.len());
    Ok(lookup)
}

/// A batch whose setup succeeded: the source is open, its header mapped and
/// the zone table loaded. No row has been read yet.
#[derive(Debug)]
pub struct PreparedBatch {
    source: SourceRows,
    columns: ColumnMap,
    lookup: voter_zones::ZoneLookup,
}

/// Runs every setup step that can fail the whole batch.
pub fn prepare_batch(
    opts: &IngestOptions,
    config: &IngestConfig,
    store: &dyn VoterStore,
) -> IngestResult<PreparedBatch> {
    let source = read_source(&opts.file, opts.sheet.as_deref(), config)?;
    let columns = io_common::map_columns(&source.header)?;
    let lookup = load_zone_lookup(store)?;
    Ok(PreparedBatch {
        source,
        columns,
        lookup,
    })
}

/// Reads, normalizes, resolves and stores every row of a prepared batch.
pub fn execute_batch(
    opts: &IngestOptions,
    config: &IngestConfig,
    store: &mut dyn VoterStore,
    prepared: PreparedBatch,
) -> IngestResult<BatchSummary> {
    let PreparedBatch {
        mut source,
        columns,
        lookup,
    } = prepared;
    let mut ctx = BatchContext::new(config, lookup, opts.today, opts.mode);
    ctx.summary.source_file = io_common::simplify_file_name(&opts.file);
    let batch_size = opts.batch_size.unwrap_or(config.batch_size).max(1);
    pipeline::run_batch(&mut ctx, store, &mut source, &columns, batch_size)?;

    let stored = store.count_voters().context(StoreSnafu {})?;
    ctx.summary.set_verification(stored);
    if stored != ctx.summary.total_rows {
        warn!(
            "Stored voters ({}) differ from the rows in the source ({})",
            stored, ctx.summary.total_rows
        );
    }
    Ok(ctx.summary)
}

/// Runs one ingestion batch: read, normalize, resolve and store every row.
///
/// Only setup failures and source read failures are returned as errors.
/// Row failures are counted in the summary.
pub fn run_ingest(
    opts: &IngestOptions,
    config: &IngestConfig,
    store: &mut dyn VoterStore,
) -> IngestResult<BatchSummary> {
    let prepared = prepare_batch(opts, config, store)?;
    execute_batch(opts, config, store, prepared)
}

/// Deletes votes, then voter profiles, then voter accounts.
pub fn run_wipe(store: &mut dyn VoterStore) -> IngestResult<WipeReport> {
    let report = store.wipe_voters().context(StoreSnafu {})?;
    info!(
        "Wiped {} votes, {} voters, {} voter accounts",
        report.votes, report.voters, report.users
    );
    Ok(report)
}

/// Wipes the store then runs a full insert.
///
/// The batch is prepared first: a source or a zone table that would fail
/// the batch leaves the store untouched.
pub fn run_reload(
    opts: &IngestOptions,
    config: &IngestConfig,
    store: &mut dyn VoterStore,
) -> IngestResult<BatchSummary> {
    let opts = IngestOptions {
        mode: IngestMode::Insert,
        ..opts.clone()
    };
    let prepared = prepare_batch(&opts, config, store)?;
    run_wipe(store)?;
    execute_batch(&opts, config, store, prepared)
}

pub fn run_seed_zones(path: &str, store: &mut dyn VoterStore) -> IngestResult<usize> {
    let zones = read_zone_seed(path)?;
    let count = store.upsert_zones(&zones).context(StoreSnafu {})?;
    info!("Loaded {} zones from {:?}", count, path);
    Ok(count)
}

fn summary_to_json(summary: &BatchSummary) -> IngestResult<String> {
    serde_json::to_string_pretty(summary).context(SerializingSummarySnafu {})
}

/// Writes the summary to a file, or to the standard output for `stdout`.
pub fn write_summary(summary: &BatchSummary, out: Option<&str>) -> IngestResult<()> {
    let js = summary_to_json(summary)?;
    match out {
        None | Some("stdout") => {
            println!("{}", js);
            Ok(())
        }
        Some(path) => fs::write(path, js).context(WritingSummarySnafu { path }),
    }
}

/// Compares a summary with a reference summary file.
pub fn check_reference(summary: &BatchSummary, reference_path: &str) -> IngestResult<()> {
    let contents = fs::read_to_string(reference_path).context(OpeningJsonSnafu {
        path: reference_path,
    })?;
    let reference: JSValue = serde_json::from_str(&contents).context(ParsingJsonSnafu {
        path: reference_path,
    })?;
    let pretty_reference =
        serde_json::to_string_pretty(&reference).context(SerializingSummarySnafu {})?;
    let pretty_summary = summary_to_json(summary)?;
    if pretty_reference != pretty_summary {
        warn!("Found differences with the reference summary");
        print_diff(pretty_reference.as_str(), pretty_summary.as_str(), "\n");
        whatever!("Difference detected between the run summary and the reference summary")
    }
    Ok(())
}

fn finish_batch(summary: &BatchSummary, source: &SourceArgs) -> IngestResult<()> {
    summary.log();
    write_summary(summary, source.out.as_deref())?;
    if let Some(reference) = &source.reference {
        check_reference(summary, reference)?;
    }
    Ok(())
}

/// Entry point of the command line.
pub fn run_command(args: &Args) -> IngestResult<()> {
    let config = read_config(args.config.as_deref())?;
    debug!("config: {:?}", config);
    let mut store = SqliteVoterStore::open(&args.db).context(StoreSnafu {})?;
    match &args.command {
        Command::Ingest { source, mode } => {
            let opts = IngestOptions::from_args(source, *mode, &config)?;
            let summary = run_ingest(&opts, &config, &mut store)?;
            finish_batch(&summary, source)
        }
        Command::Reload { source } => {
            let opts = IngestOptions::from_args(source, IngestMode::Insert, &config)?;
            let summary = run_reload(&opts, &config, &mut store)?;
            finish_batch(&summary, source)
        }
        Command::Wipe { yes } => {
            ensure_whatever!(*yes, "Refusing to wipe the voter store without --yes");
            let report = run_wipe(&mut store)?;
            let js = serde_json::to_string_pretty(&report).context(SerializingSummarySnafu {})?;
            println!("{}", js);
            Ok(())
        }
        Command::SeedZones { zones } => {
            run_seed_zones(zones, &mut store)?;
            Ok(())
        }
        Command::Count => {
            let count = store.count_voters().context(StoreSnafu {})?;
            println!("{}", count);
            Ok(())
        }
    }
}
