// The row pipeline: normalize, resolve, build and write, one chunk at a time.

use chrono::NaiveDate;
use log::{debug, info, warn};

use voter_zones::normalize::{
    derive_age, format_dob, normalize_dob, normalize_email, normalize_phone,
};
use voter_zones::{resolve_voter, NormalizedVoter, ZoneLookup, MIN_VOTING_AGE};

use crate::ingest::config_reader::IngestConfig;
use crate::ingest::io_common::{ColumnMap, Field, RawRow, SourceRow, SourceRows};
use crate::ingest::sink::{build_record, write_record, IngestMode, RowOutcome, SkipReason};
use crate::ingest::store::VoterStore;
use crate::ingest::summary::BatchSummary;
use crate::ingest::IngestResult;

/// Row errors logged with their full context. Later ones get one line.
const VERBOSE_ERROR_LOGS: usize = 5;

/// The state of one batch run, shared by all its rows.
pub struct BatchContext<'a> {
    pub config: &'a IngestConfig,
    pub lookup: ZoneLookup,
    /// The reference date for ages.
    pub today: NaiveDate,
    pub mode: IngestMode,
    pub summary: BatchSummary,
    errors_logged: usize,
}

impl<'a> BatchContext<'a> {
    pub fn new(config: &'a IngestConfig, lookup: ZoneLookup, today: NaiveDate, mode: IngestMode) -> Self {
        BatchContext {
            config,
            lookup,
            today,
            mode,
            summary: BatchSummary {
                mode: mode.as_str().to_string(),
                ..BatchSummary::default()
            },
            errors_logged: 0,
        }
    }

    fn log_row_error(&mut self, row: &RawRow, voter_id: Option<&str>, msg: &str) {
        self.errors_logged += 1;
        if self.errors_logged <= VERBOSE_ERROR_LOGS {
            warn!(
                "Row {} (voter {:?}) could not be stored: {}. Cells: {:?}",
                row.lineno, voter_id, msg, row.cells
            );
            if self.errors_logged == VERBOSE_ERROR_LOGS {
                warn!("Further row errors are logged without details");
            }
        } else {
            warn!("Row {}: store error", row.lineno);
        }
    }
}

/// Normalizes the fields of a row.
///
/// A date of birth that is present but unreadable falls back to the age
/// column, leaving `dob` empty. Without an age the row is skipped.
pub fn normalize_row(
    row: &RawRow,
    columns: &ColumnMap,
    today: NaiveDate,
) -> Result<NormalizedVoter, SkipReason> {
    let voter_id = columns
        .text(row, Field::VoterId)
        .ok_or(SkipReason::MissingVoterId)?;
    let name = columns.text(row, Field::Name).ok_or(SkipReason::MissingName)?;

    let raw_dob = columns.cell(row, Field::Dob).and_then(|c| c.as_dob());
    let dob = raw_dob.as_ref().and_then(normalize_dob);
    let sheet_age = columns.cell(row, Field::Age).and_then(|c| c.as_age());
    if raw_dob.is_some() && dob.is_none() {
        if sheet_age.is_none() {
            return Err(SkipReason::InvalidDob);
        }
        debug!(
            "normalize_row: row {}: unreadable date of birth {:?}, using the age column",
            row.lineno, raw_dob
        );
    }
    let age = derive_age(dob, sheet_age, today);
    if age < MIN_VOTING_AGE {
        return Err(SkipReason::Under18);
    }

    Ok(NormalizedVoter {
        voter_id,
        name,
        dob: dob.map(format_dob),
        age,
        phone: columns
            .text(row, Field::Phone)
            .and_then(|s| normalize_phone(&s)),
        email: columns
            .text(row, Field::Email)
            .and_then(|s| normalize_email(&s)),
        address: columns.text(row, Field::Address),
        city: columns.text(row, Field::City),
        state: columns.text(row, Field::State),
        region_label: columns.text(row, Field::Region).unwrap_or_default(),
        family_number: columns.text(row, Field::FamilyNumber),
    })
}

/// Runs one row through all the stages. Diagnostics go to `partial`, the
/// outcome is returned.
pub fn process_row(
    ctx: &BatchContext,
    store: &mut dyn VoterStore,
    row: &RawRow,
    columns: &ColumnMap,
    partial: &mut BatchSummary,
) -> RowOutcome {
    let voter = match normalize_row(row, columns, ctx.today) {
        Ok(v) => v,
        Err(reason) => {
            debug!("process_row: row {} skipped: {}", row.lineno, reason.as_str());
            return RowOutcome::Skipped(reason);
        }
    };
    if voter.dob.is_none() && columns.cell(row, Field::Dob).map_or(false, |c| !c.is_empty()) {
        partial.record_dob_fallback();
    }
    let resolved = resolve_voter(voter, &ctx.config.resolver, &ctx.lookup);
    if resolved.zones.used_default_mapping {
        partial.record_default_fallback(&resolved.voter.region_label);
    }
    for key in resolved.zones.missing_codes.iter() {
        partial.record_missing_code(&key.to_string());
    }
    let record = match build_record(&resolved, row.lineno, &ctx.config.placeholder_email_domain) {
        Ok(r) => r,
        Err(reason) => {
            debug!(
                "process_row: row {}: no zone for region {:?}",
                row.lineno, resolved.voter.region_label
            );
            partial.record_no_zone(&resolved.voter.region_label);
            return RowOutcome::Skipped(reason);
        }
    };
    let outcome = write_record(store, &record, ctx.mode);
    debug!(
        "process_row: row {} voter {} zone {} -> {:?}",
        row.lineno, record.voter_id, record.region_name, outcome
    );
    outcome
}

/// Runs all the rows of a source, reading `batch_size` rows at a time.
///
/// The counters of each chunk are merged into `ctx.summary` once the chunk
/// is done. Row failures never stop the batch. A source that cannot be read
/// further does, keeping the rows already stored.
pub fn run_batch(
    ctx: &mut BatchContext,
    store: &mut dyn VoterStore,
    source: &mut SourceRows,
    columns: &ColumnMap,
    batch_size: usize,
) -> IngestResult<()> {
    let batch_size = batch_size.max(1);
    let progress_interval = ctx.config.progress_interval.max(1);
    info!(
        "Processing rows in {} mode, {} rows at a time",
        ctx.mode.as_str(),
        batch_size
    );

    let mut seen: usize = 0;
    loop {
        let chunk = source.next_chunk(batch_size)?;
        if chunk.is_empty() {
            break;
        }
        let mut partial = BatchSummary::default();
        for item in chunk.iter() {
            let row = match item {
                SourceRow::Data(row) => row,
                SourceRow::Unreadable(lineno) => {
                    debug!("run_batch: row {} is unreadable", lineno);
                    partial.total_rows += 1;
                    partial.record(&RowOutcome::Skipped(SkipReason::UnreadableRow));
                    continue;
                }
            };
            if row.is_blank() {
                partial.blank_rows += 1;
                continue;
            }
            partial.total_rows += 1;
            let outcome = process_row(ctx, store, row, columns, &mut partial);
            if let RowOutcome::Error(msg) = &outcome {
                let voter_id = columns.text(row, Field::VoterId);
                ctx.log_row_error(row, voter_id.as_deref(), msg);
            }
            partial.record(&outcome);
            seen += 1;
            if seen % progress_interval == 0 {
                info!(
                    "Progress: {} rows, {} inserted, {} updated so far",
                    seen,
                    ctx.summary.processed + partial.processed,
                    ctx.summary.updated + partial.updated
                );
            }
        }
        ctx.summary.merge(&partial);
    }
    info!(
        "Processed {} rows: {} inserted, {} updated, {} duplicates, {} skipped, {} errors",
        ctx.summary.handled(),
        ctx.summary.processed,
        ctx.summary.updated,
        ctx.summary.duplicates,
        ctx.summary.skipped,
        ctx.summary.errors
    );
    Ok(())
}
