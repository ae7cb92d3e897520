use clap::{Parser, Subcommand};

use crate::ingest::IngestMode;

/// Loads community voter rolls into the election store.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Command,

    /// (file path, default voters.db) The SQLite database holding zones and voters.
    #[clap(long, value_parser, global = true, default_value = "voters.db")]
    pub db: String,

    /// (file path, optional) The JSON ingest configuration: region table, aliases, batch size.
    /// Every key that is not given takes its default value.
    #[clap(short, long, value_parser, global = true)]
    pub config: Option<String>,

    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Reads a voter roll and stores its voters.
    Ingest {
        #[clap(flatten)]
        source: SourceArgs,

        /// (insert or upsert, default insert) In insert mode, voters already stored are
        /// counted as duplicates. In upsert mode, they are updated.
        #[clap(long, value_enum, default_value = "insert")]
        mode: IngestMode,
    },
    /// Deletes all the voters, then reads a voter roll in insert mode.
    Reload {
        #[clap(flatten)]
        source: SourceArgs,
    },
    /// Deletes the votes, the voter profiles and the voter accounts.
    Wipe {
        /// Required: confirms the deletion.
        #[clap(long, takes_value = false)]
        yes: bool,
    },
    /// Loads or refreshes the zone table from a JSON file.
    SeedZones {
        /// (file path) A JSON list of {id, code, name, electionType, seats}.
        #[clap(value_parser)]
        zones: String,
    },
    /// Prints the number of stored voters.
    Count,
}

#[derive(clap::Args, Debug, Clone)]
pub struct SourceArgs {
    /// (file path, optional) The voter roll, .xlsx or .csv. Defaults to the configured
    /// input file.
    #[clap(value_parser)]
    pub file: Option<String>,

    /// (default "MASTER DATA to Import") When using an Excel file, the name of the worksheet
    /// to use. Falls back to the first worksheet.
    #[clap(long, value_parser)]
    pub sheet: Option<String>,

    /// (YYYY-MM-DD, default today) The date ages are computed at.
    #[clap(long, value_parser)]
    pub today: Option<String>,

    /// (default from the configuration) The number of rows read and processed as one chunk.
    #[clap(long, value_parser)]
    pub batch_size: Option<usize>,

    /// (file path, 'stdout' or empty) If specified, the summary of the run will be written in
    /// JSON format to the given location.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path) A reference summary in JSON format. If provided, voteringest will check
    /// that the summary of the run matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,
}
