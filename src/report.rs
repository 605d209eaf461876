use log::{debug, info, warn};

use snafu::{prelude::*, Snafu};

use std::cell::OnceCell;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use vote_reconcile::builder::MemoryRecords;
use vote_reconcile::*;

use crate::args::Args;
use crate::report::config_reader::*;
use crate::report::io_common::parse_query_date;

pub mod config_reader;
pub mod io_common;
pub mod io_csv;
pub mod io_json;
pub mod io_xlsx;
pub mod migrate;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ReportError {
    #[snafu(display("Error opening file {path}"))]
    OpeningFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error writing file {path}"))]
    WritingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON file {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error producing JSON output"))]
    WritingJson { source: serde_json::Error },
    #[snafu(display("Error opening Excel file {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("Worksheet {name:?} not found in {path}"))]
    MissingWorksheet { path: String, name: String },
    #[snafu(display("{path} has several worksheets, the worksheet name must be provided"))]
    AmbiguousWorksheet { path: String },
    #[snafu(display("Unexpected cell at line {lineno}: {content}"))]
    ExcelWrongCellType { lineno: u64, content: String },
    #[snafu(display("Error opening CSV file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error reading line of CSV file {path}"))]
    CsvLineParse { source: csv::Error, path: String },
    #[snafu(display("{path}: line {lineno} has no column {column}"))]
    LineTooShort {
        path: String,
        lineno: u64,
        column: usize,
    },
    #[snafu(display("{path}: record {lineno}: {source}"))]
    InvalidRecord {
        source: RecordErrors,
        path: String,
        lineno: u64,
    },
    #[snafu(display("Cannot understand date {value:?} (expected YYYY-MM-DD or RFC 3339)"))]
    InvalidDate { value: String },
    #[snafu(display("The start date {start} is after the end date {end}"))]
    InvalidRange { start: String, end: String },
    #[snafu(display("{message}"))]
    UnknownGranularity { message: String },
    #[snafu(display("Provider not implemented {provider:?}"))]
    UnknownProvider { provider: String },
    #[snafu(display("Unknown record kind {kind:?} (expected all, feedback or votes)"))]
    UnknownRecordKind { kind: String },
    #[snafu(display("Provider {provider:?} needs a single record kind, got {kind:?}"))]
    UnsupportedRecordKind { provider: String, kind: String },
    #[snafu(display("Hourly timelines require a date range within a single day"))]
    HourlyRangeTooWide {},
    #[snafu(display("No account given (use --account or the query section of the configuration)"))]
    MissingAccount {},
    #[snafu(display("No record source given (use --input or a configuration file)"))]
    MissingInput {},
    #[snafu(display("Cannot find the directory of {path}"))]
    MissingParentDir { path: String },
    #[snafu(display("Difference detected between the report and the reference {path}"))]
    ReferenceMismatch { path: String },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type ReportResult<T> = Result<T, ReportError>;

/// The records held by a source.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum RecordKind {
    All,
    Feedback,
    Votes,
}

impl RecordKind {
    pub fn parse(s: Option<&str>) -> ReportResult<RecordKind> {
        match s.map(|x| x.trim().to_lowercase()).as_deref() {
            None | Some("all") | Some("") => Ok(RecordKind::All),
            Some("feedback") => Ok(RecordKind::Feedback),
            Some("votes") | Some("vote") => Ok(RecordKind::Votes),
            Some(x) => UnknownRecordKindSnafu { kind: x }.fail(),
        }
    }

    pub fn has_feedback(self) -> bool {
        self != RecordKind::Votes
    }

    pub fn has_votes(self) -> bool {
        self != RecordKind::Feedback
    }
}

/// Reads all the records of one source, without filtering.
pub fn read_source(cfs: &FileSource) -> ReportResult<MemoryRecords> {
    let kind = cfs.record_kind()?;
    info!(
        "Attempting to read {:?} records from {:?} ({})",
        kind, cfs.file_path, cfs.provider
    );
    let records = match cfs.provider.as_str() {
        "json" => io_json::read_json_export(&cfs.file_path, kind),
        "csv" => io_csv::read_csv_records(&cfs.file_path, kind),
        "xlsx" | "excel" => io_xlsx::read_xlsx_records(&cfs.file_path, kind, cfs),
        x => UnknownProviderSnafu { provider: x }.fail(),
    }?;
    debug!(
        "read_source: {:?}: {} feedback records, {} votes",
        cfs.file_path,
        records.feedback().len(),
        records.votes().len()
    );
    Ok(records)
}

/// The record store of a report: the files of the sources.
///
/// The files are read once, on the first request, and both record sets are
/// served from that snapshot.
pub struct SourceReader {
    sources: Vec<FileSource>,
    snapshot: OnceCell<MemoryRecords>,
}

impl SourceReader {
    pub fn new(sources: Vec<FileSource>) -> SourceReader {
        SourceReader {
            sources,
            snapshot: OnceCell::new(),
        }
    }

    fn read_all_sources(&self) -> ReportResult<MemoryRecords> {
        let mut all = MemoryRecords::default();
        for cfs in self.sources.iter() {
            all.extend(read_source(cfs)?);
        }
        Ok(all)
    }

    /// All the records of all the sources, without filtering.
    pub fn load_all(&self) -> ReportResult<&MemoryRecords> {
        if let Some(records) = self.snapshot.get() {
            return Ok(records);
        }
        let records = self.read_all_sources()?;
        Ok(self.snapshot.get_or_init(|| records))
    }
}

impl RecordReader for SourceReader {
    type Error = ReportError;

    fn read_feedback(
        &self,
        account: &str,
        range: &DateRange,
    ) -> ReportResult<Vec<FeedbackRecord>> {
        Ok(self
            .load_all()?
            .read_feedback(account, range)
            .unwrap_or_else(|e| match e {}))
    }

    fn read_standalone_votes(
        &self,
        account: &str,
        range: &DateRange,
    ) -> ReportResult<Vec<StandaloneVoteRecord>> {
        Ok(self
            .load_all()?
            .read_standalone_votes(account, range)
            .unwrap_or_else(|e| match e {}))
    }
}

/// What a report is about, once the configuration and the flags are merged.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ReportQuery {
    pub account: String,
    pub range: DateRange,
    pub granularity: Granularity,
}

fn resolve_query(query: &QuerySettings, args: &Args) -> ReportResult<ReportQuery> {
    let account = args
        .account
        .clone()
        .or_else(|| query.account.clone())
        .filter(|s| !s.trim().is_empty())
        .context(MissingAccountSnafu {})?;
    let start = match args.from.as_ref().or(query.start_date.as_ref()) {
        Some(s) => Some(parse_query_date(s, false)?),
        None => None,
    };
    let end = match args.to.as_ref().or(query.end_date.as_ref()) {
        Some(s) => Some(parse_query_date(s, true)?),
        None => None,
    };
    if let (Some(s), Some(e)) = (start, end) {
        ensure!(
            s <= e,
            InvalidRangeSnafu {
                start: s.to_rfc3339(),
                end: e.to_rfc3339()
            }
        );
    }
    let granularity = match args.granularity.as_ref().or(query.granularity.as_ref()) {
        Some(g) => g
            .parse::<Granularity>()
            .map_err(|message| ReportError::UnknownGranularity { message })?,
        None => Granularity::Day,
    };
    Ok(ReportQuery {
        account,
        range: DateRange::new(start, end),
        granularity,
    })
}

/// Hourly timelines are only meaningful for a single day.
pub fn check_granularity(query: &ReportQuery) -> ReportResult<()> {
    ensure!(
        query.granularity != Granularity::Hour || query.range.is_single_day(),
        HourlyRangeTooWideSnafu {}
    );
    Ok(())
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn summary_to_json(summary: &Summary) -> JSValue {
    let mut counts: JSMap<String, JSValue> = JSMap::new();
    let mut percentages: JSMap<String, JSValue> = JSMap::new();
    for cc in summary.counts.iter() {
        counts.insert(cc.category.name().to_string(), json!(cc.count));
        percentages.insert(cc.category.name().to_string(), json!(round2(cc.percentage)));
    }
    json!({
        "totalCount": summary.total_count,
        "counts": counts,
        "percentages": percentages,
        "averageScore": summary.average_score.map(round2),
        "averageLabel": summary.average_label,
    })
}

fn timeline_to_json(timeline: &[TimelineBucket]) -> Vec<JSValue> {
    timeline
        .iter()
        .map(|b| json!({"bucket": b.key.label(), "count": b.count}))
        .collect()
}

fn build_report_js(
    report_name: &str,
    query: &ReportQuery,
    summary: &Summary,
    timeline: &[TimelineBucket],
) -> JSValue {
    let c = OutputConfig {
        report_name: report_name.to_string(),
        account: query.account.clone(),
        start_date: query
            .range
            .start
            .map(|d| d.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
        end_date: query
            .range
            .end
            .map(|d| d.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
        granularity: query.granularity.name().to_string(),
    };
    json!({
        "config": c,
        "summary": summary_to_json(summary),
        "timeline": timeline_to_json(timeline),
    })
}

fn resolve_path(root: &Path, file_path: &str) -> String {
    let p: PathBuf = [root, Path::new(file_path)].iter().collect();
    p.as_path().display().to_string()
}

// The sources of the report, with their paths resolved.
fn collect_sources(args: &Args, config: Option<&(ReportConfig, PathBuf)>) -> ReportResult<Vec<FileSource>> {
    if let Some(input) = args.input.clone() {
        return Ok(vec![FileSource {
            provider: args.input_type.clone().unwrap_or_else(|| "json".to_string()),
            file_path: input,
            record_kind: args.record_kind.clone(),
            excel_worksheet_name: args.excel_worksheet_name.clone(),
        }]);
    }
    match config {
        Some((c, root)) if !c.record_sources.is_empty() => Ok(c
            .record_sources
            .iter()
            .map(|cfs| FileSource {
                file_path: resolve_path(root, &cfs.file_path),
                ..cfs.clone()
            })
            .collect()),
        _ => MissingInputSnafu {}.fail(),
    }
}

fn write_output(out: Option<String>, pretty: &str) -> ReportResult<()> {
    match out.as_deref() {
        None | Some("stdout") => {
            println!("{}", pretty);
        }
        Some(path) => {
            info!("Writing report to {:?}", path);
            fs::write(path, pretty).context(WritingFileSnafu { path })?;
        }
    }
    Ok(())
}

fn check_reference(reference_path: &str, pretty_js_stats: &str) -> ReportResult<()> {
    let summary_ref = read_summary(reference_path)?;
    debug!("reference: {:?}", summary_ref);
    let pretty_js_summary_ref = serde_json::to_string_pretty(&summary_ref).context(WritingJsonSnafu {})?;
    if pretty_js_summary_ref != pretty_js_stats {
        warn!("Found differences with the reference string");
        print_diff(pretty_js_summary_ref.as_str(), pretty_js_stats, "\n");
        return ReferenceMismatchSnafu {
            path: reference_path,
        }
        .fail();
    }
    info!("The report matches the reference {:?}", reference_path);
    Ok(())
}

/// Runs a report (or the migration step) as described by the command line.
///
/// Returns the JSON document that was produced.
pub fn run_report(args: &Args) -> ReportResult<JSValue> {
    let config: Option<(ReportConfig, PathBuf)> = match args.config.as_ref() {
        Some(config_path) => {
            let c = read_config(config_path)?;
            let root = Path::new(config_path.as_str())
                .parent()
                .context(MissingParentDirSnafu {
                    path: config_path.clone(),
                })?
                .to_path_buf();
            info!("config: {:?}", c);
            Some((c, root))
        }
        None => None,
    };

    let sources = collect_sources(args, config.as_ref())?;

    if let Some(migrate_path) = args.migrate_out.as_ref() {
        return migrate::run_migration(&SourceReader::new(sources), migrate_path);
    }

    let default_query = QuerySettings::default();
    let query_settings = config.as_ref().map(|(c, _)| &c.query).unwrap_or(&default_query);
    let query = resolve_query(query_settings, args)?;
    check_granularity(&query)?;

    let rules = match config.as_ref().and_then(|(c, _)| c.rules.as_ref()) {
        Some(r) => r.to_rules()?,
        None => ReconcileRules::DEFAULT_RULES,
    };
    info!("query: {:?} rules: {:?}", query, rules);

    let reader = SourceReader::new(sources);
    let signals = reconcile(&reader, &query.account, &query.range, &rules)?;
    let summary = summarize(&signals);
    let timeline = build_timeline(&signals, query.granularity);
    info!(
        "{} signals, average {:?} ({})",
        summary.total_count, summary.average_score, summary.average_label
    );

    let report_name = config
        .as_ref()
        .map(|(c, _)| c.output_settings.report_name.clone())
        .unwrap_or_else(|| "satrep".to_string());
    let result_js = build_report_js(&report_name, &query, &summary, &timeline);
    let pretty_js_stats = serde_json::to_string_pretty(&result_js).context(WritingJsonSnafu {})?;

    let out = args.out.clone().or_else(|| {
        config.as_ref().and_then(|(c, root)| {
            c.output_settings
                .output_directory
                .as_ref()
                .map(|dir| resolve_path(&root.join(dir), "summary.json"))
        })
    });
    write_output(out, &pretty_js_stats)?;

    // The reference report, if provided for comparison
    if let Some(reference_path) = args.reference.as_ref() {
        check_reference(reference_path, &pretty_js_stats)?;
    }

    Ok(result_js)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_args() -> Args {
        Args {
            config: None,
            reference: None,
            out: None,
            input: None,
            input_type: None,
            record_kind: None,
            excel_worksheet_name: None,
            account: None,
            from: None,
            to: None,
            granularity: None,
            migrate_out: None,
            verbose: false,
        }
    }

    fn test_dir() -> String {
        format!("{}/testdata", env!("CARGO_MANIFEST_DIR"))
    }

    fn test_wrapper(test_name: &str) {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = test_dir();
        let args = Args {
            config: Some(format!("{}/{}/{}_config.json", dir, test_name, test_name)),
            reference: Some(format!(
                "{}/{}/{}_expected_summary.json",
                dir, test_name, test_name
            )),
            ..empty_args()
        };
        let res = run_report(&args);
        if let Err(e) = &res {
            eprintln!("An error occured {}", e);
        }
        assert!(res.is_ok());
    }

    #[test]
    fn kiosk_day() {
        test_wrapper("kiosk_day");
    }

    #[test]
    fn monthly_csv() {
        test_wrapper("monthly_csv");
    }

    #[test]
    fn kiosk_xlsx() {
        test_wrapper("kiosk_xlsx");
    }

    #[test]
    fn command_line_without_config() {
        let args = Args {
            input: Some(format!("{}/kiosk_day/kiosk_day_export.json", test_dir())),
            account: Some("acme".to_string()),
            from: Some("2024-01-01".to_string()),
            to: Some("2024-01-01".to_string()),
            ..empty_args()
        };
        let js = run_report(&args).unwrap();
        assert_eq!(js["summary"]["totalCount"], json!(6));
        assert_eq!(js["config"]["granularity"], json!("day"));
        assert_eq!(js["timeline"][0]["bucket"], json!("2024-01-01"));
        assert_eq!(js["timeline"][0]["count"], json!(6));
    }

    #[test]
    fn hourly_timeline_needs_a_single_day() {
        let args = Args {
            input: Some(format!("{}/kiosk_day/kiosk_day_export.json", test_dir())),
            account: Some("acme".to_string()),
            from: Some("2024-01-01".to_string()),
            to: Some("2024-01-02".to_string()),
            granularity: Some("hour".to_string()),
            ..empty_args()
        };
        assert!(matches!(
            run_report(&args),
            Err(ReportError::HourlyRangeTooWide {})
        ));

        let unbounded = Args {
            from: None,
            to: None,
            ..args
        };
        assert!(matches!(
            run_report(&unbounded),
            Err(ReportError::HourlyRangeTooWide {})
        ));
    }

    #[test]
    fn reversed_range_is_rejected() {
        let args = Args {
            input: Some(format!("{}/kiosk_day/kiosk_day_export.json", test_dir())),
            account: Some("acme".to_string()),
            from: Some("2024-01-02".to_string()),
            to: Some("2024-01-01".to_string()),
            ..empty_args()
        };
        assert!(matches!(
            run_report(&args),
            Err(ReportError::InvalidRange { .. })
        ));
    }

    #[test]
    fn account_is_required() {
        let args = Args {
            input: Some(format!("{}/kiosk_day/kiosk_day_export.json", test_dir())),
            ..empty_args()
        };
        assert!(matches!(
            run_report(&args),
            Err(ReportError::MissingAccount {})
        ));
    }

    #[test]
    fn no_data_is_an_empty_report() {
        let args = Args {
            input: Some(format!("{}/kiosk_day/kiosk_day_export.json", test_dir())),
            account: Some("nobody".to_string()),
            ..empty_args()
        };
        let js = run_report(&args).unwrap();
        assert_eq!(js["summary"]["totalCount"], json!(0));
        assert_eq!(js["summary"]["averageScore"], JSValue::Null);
        assert_eq!(js["summary"]["averageLabel"], json!("N/A"));
        assert_eq!(js["timeline"], json!([]));
    }

    #[test]
    fn unknown_vote_category_is_an_error() {
        let args = Args {
            input: Some(format!("{}/bad_vote/bad_vote_export.json", test_dir())),
            account: Some("acme".to_string()),
            ..empty_args()
        };
        assert!(matches!(
            run_report(&args),
            Err(ReportError::InvalidRecord {
                source: RecordErrors::UnknownCategory(_),
                ..
            })
        ));
    }

    #[test]
    fn reference_mismatch_is_reported() {
        let dir = test_dir();
        let args = Args {
            config: Some(format!("{}/monthly_csv/monthly_csv_config.json", dir)),
            reference: Some(format!("{}/kiosk_day/kiosk_day_expected_summary.json", dir)),
            ..empty_args()
        };
        assert!(matches!(
            run_report(&args),
            Err(ReportError::ReferenceMismatch { .. })
        ));
    }

    #[test]
    fn sources_are_read_once_per_request() {
        let path = std::env::temp_dir().join("satrep_single_snapshot.json");
        let path_str = path.display().to_string();
        let first = json!({
            "feedback": [{"account": "acme", "createdAt": "2024-01-01T10:00:00Z", "overall": "like"}],
            "votes": [{"account": "acme", "createdAt": "2024-01-01T12:00:00Z", "vote": "dislike"}]
        });
        fs::write(&path, first.to_string()).unwrap();
        let reader = SourceReader::new(vec![FileSource {
            provider: "json".to_string(),
            file_path: path_str.clone(),
            record_kind: None,
            excel_worksheet_name: None,
        }]);

        let fb = reader
            .read_feedback("acme", &DateRange::UNBOUNDED)
            .unwrap();
        assert_eq!(fb.len(), 1);

        // Both record sets come from the snapshot taken by the first read.
        fs::write(&path, json!({"votes": []}).to_string()).unwrap();
        let votes = reader
            .read_standalone_votes("acme", &DateRange::UNBOUNDED)
            .unwrap();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].category, Category::Dislike);
        let _ = fs::remove_file(path);
    }

    #[test]
    fn record_kinds() {
        assert_eq!(RecordKind::parse(None).unwrap(), RecordKind::All);
        assert_eq!(RecordKind::parse(Some("Votes")).unwrap(), RecordKind::Votes);
        assert_eq!(
            RecordKind::parse(Some("feedback")).unwrap(),
            RecordKind::Feedback
        );
        assert!(RecordKind::parse(Some("ballots")).is_err());
        assert!(RecordKind::Feedback.has_feedback());
        assert!(!RecordKind::Feedback.has_votes());
    }
}
