// Primitives for reading CSV files.

use std::fs::File;

use crate::report::{
    io_common::{build_feedback, build_vote, non_blank, normalize_reference_str, parse_timestamp},
    *,
};

// Fixed column layouts.
pub const FEEDBACK_FIRST_QUESTION_COL: usize = 4;
pub const VOTE_NUM_COLS: usize = 6;

pub fn read_csv_records(path: &str, kind: RecordKind) -> ReportResult<MemoryRecords> {
    match kind {
        RecordKind::Feedback => Ok(MemoryRecords::new(read_csv_feedback(path)?, vec![])),
        RecordKind::Votes => Ok(MemoryRecords::new(vec![], read_csv_votes(path)?)),
        RecordKind::All => UnsupportedRecordKindSnafu {
            provider: "csv",
            kind: "all",
        }
        .fail(),
    }
}

fn get_records(path: &str) -> ReportResult<csv::StringRecordsIntoIter<File>> {
    let rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .context(CsvOpenSnafu { path })?;
    Ok(rdr.into_records())
}

// The header is line 1.
fn lineno_of(idx: usize) -> u64 {
    (idx + 2) as u64
}

fn required<'a>(line: &'a csv::StringRecord, column: usize, path: &str, lineno: u64) -> ReportResult<&'a str> {
    line.get(column)
        .context(LineTooShortSnafu {
            path,
            lineno,
            column,
        })
}

fn optional(line: &csv::StringRecord, column: usize) -> Option<String> {
    non_blank(line.get(column))
}

pub fn read_csv_feedback(path: &str) -> ReportResult<Vec<FeedbackRecord>> {
    let mut res: Vec<FeedbackRecord> = Vec::new();
    for (idx, line_r) in get_records(path)?.enumerate() {
        let lineno = lineno_of(idx);
        let line = line_r.context(CsvLineParseSnafu { path })?;
        debug!("read_csv_feedback: lineno: {:?} row: {:?}", lineno, &line);
        let account = required(&line, 0, path, lineno)?;
        let timestamp = parse_timestamp(required(&line, 1, path, lineno)?)
            .context(InvalidRecordSnafu { path, lineno })?;
        let overall = optional(&line, 2);
        let device = line.get(3).and_then(normalize_reference_str);

        let mut questions: Vec<(Option<String>, Option<String>)> = Vec::new();
        let mut col = FEEDBACK_FIRST_QUESTION_COL;
        while col < line.len() {
            questions.push((optional(&line, col), optional(&line, col + 1)));
            col += 2;
        }

        res.push(build_feedback(
            account,
            timestamp,
            overall.as_deref(),
            &questions,
            device,
            &format!("{}: line {}", path, lineno),
        ));
    }
    Ok(res)
}

pub fn read_csv_votes(path: &str) -> ReportResult<Vec<StandaloneVoteRecord>> {
    let mut res: Vec<StandaloneVoteRecord> = Vec::new();
    for (idx, line_r) in get_records(path)?.enumerate() {
        let lineno = lineno_of(idx);
        let line = line_r.context(CsvLineParseSnafu { path })?;
        debug!("read_csv_votes: lineno: {:?} row: {:?}", lineno, &line);
        if line.len() > VOTE_NUM_COLS {
            warn!(
                "read_csv_votes: {}: line {}: ignoring {} extra columns",
                path,
                lineno,
                line.len() - VOTE_NUM_COLS
            );
        }
        let account = required(&line, 0, path, lineno)?;
        let timestamp = parse_timestamp(required(&line, 1, path, lineno)?)
            .context(InvalidRecordSnafu { path, lineno })?;
        let category = required(&line, 2, path, lineno)?;
        let question = optional(&line, 3);
        let device = line.get(4).and_then(normalize_reference_str);
        let feedback_link = line.get(5).and_then(normalize_reference_str);
        let vote = build_vote(
            account,
            timestamp,
            category,
            question.as_deref(),
            device,
            feedback_link,
        )
        .context(InvalidRecordSnafu { path, lineno })?;
        res.push(vote);
    }
    Ok(res)
}
