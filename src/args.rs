use clap::Parser;

/// This is a customer satisfaction report program. It reconciles feedback submissions and
/// single-tap votes, then summarizes them.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) The JSON file describing the report: query, record sources and rules.
    /// See the manual of vote_reconcile for the format.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,
    /// (file path) A reference report in JSON format. If provided, satrep will
    /// check that the produced report matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the report will be written in JSON format to the given
    /// location.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path or empty) A record export to read. Setting this option overrides the record sources
    /// that may be specified with the --config option.
    #[clap(short, long, value_parser)]
    pub input: Option<String>,

    /// (default json) The type of the input: json, csv or xlsx.
    #[clap(long, value_parser)]
    pub input_type: Option<String>,

    /// (default all) The records contained in the input: all, feedback or votes. csv inputs
    /// contain a single kind of record.
    #[clap(long, value_parser)]
    pub record_kind: Option<String>,

    /// When using an Excel file, indicates the name of the worksheet to use.
    #[clap(long, value_parser)]
    pub excel_worksheet_name: Option<String>,

    /// The account to report on. Overrides the account of the configuration.
    #[clap(short, long, value_parser)]
    pub account: Option<String>,

    /// (YYYY-MM-DD or RFC 3339, optional) The first day of the report, inclusive.
    #[clap(long, value_parser)]
    pub from: Option<String>,

    /// (YYYY-MM-DD or RFC 3339, optional) The last day of the report, inclusive.
    #[clap(long, value_parser)]
    pub to: Option<String>,

    /// (default day) The resolution of the timeline: hour, day or month. Hourly timelines
    /// require --from and --to to be the same day.
    #[clap(short, long, value_parser)]
    pub granularity: Option<String>,

    /// (file path) If specified, no report is produced. Instead, all the records of the inputs are
    /// normalized and written to this file as a canonical JSON export.
    #[clap(long, value_parser)]
    pub migrate_out: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
