// Primitives for reading Excel workbooks.
//
// The worksheets follow the same column layouts as the CSV files, with a header on the first row.

use calamine::{open_workbook, DataType, Range, Reader, Xlsx};

use crate::report::{
    io_common::{build_feedback, build_vote, excel_serial_to_timestamp, normalize_reference_str, parse_timestamp},
    io_csv::FEEDBACK_FIRST_QUESTION_COL,
    *,
};

const FEEDBACK_SHEET: &str = "feedback";
const VOTES_SHEET: &str = "votes";

pub fn read_xlsx_records(
    path: &str,
    kind: RecordKind,
    cfs: &FileSource,
) -> ReportResult<MemoryRecords> {
    let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningExcelSnafu { path })?;
    match kind {
        RecordKind::Feedback => {
            let wrange = get_range(&mut workbook, path, cfs.excel_worksheet_name.as_deref())?;
            Ok(MemoryRecords::new(read_feedback_rows(&wrange, path)?, vec![]))
        }
        RecordKind::Votes => {
            let wrange = get_range(&mut workbook, path, cfs.excel_worksheet_name.as_deref())?;
            Ok(MemoryRecords::new(vec![], read_vote_rows(&wrange, path)?))
        }
        RecordKind::All => {
            let feedback_range = get_named_range(&mut workbook, path, FEEDBACK_SHEET)?;
            let votes_range = get_named_range(&mut workbook, path, VOTES_SHEET)?;
            Ok(MemoryRecords::new(
                read_feedback_rows(&feedback_range, path)?,
                read_vote_rows(&votes_range, path)?,
            ))
        }
    }
}

// Looks up a worksheet by name, ignoring the case.
fn get_named_range(
    workbook: &mut Xlsx<std::io::BufReader<std::fs::File>>,
    path: &str,
    name: &str,
) -> ReportResult<Range<DataType>> {
    let sheet_name = workbook
        .sheet_names()
        .to_vec()
        .into_iter()
        .find(|s| s.eq_ignore_ascii_case(name))
        .context(MissingWorksheetSnafu { path, name })?;
    get_range(workbook, path, Some(&sheet_name))
}

fn get_range(
    workbook: &mut Xlsx<std::io::BufReader<std::fs::File>>,
    path: &str,
    worksheet_name: Option<&str>,
) -> ReportResult<Range<DataType>> {
    debug!("get_range: path: {:?} worksheet: {:?}", path, worksheet_name);
    // A worksheet name was provided, use it.
    if let Some(name) = worksheet_name {
        return workbook
            .worksheet_range(name)
            .context(MissingWorksheetSnafu { path, name })?
            .context(OpeningExcelSnafu { path });
    }
    let sheet_names = workbook.sheet_names().to_vec();
    match sheet_names.as_slice() {
        [] => MissingWorksheetSnafu { path, name: "" }.fail(),
        [name] => workbook
            .worksheet_range(name)
            .context(MissingWorksheetSnafu { path, name: name.as_str() })?
            .context(OpeningExcelSnafu { path }),
        _ => AmbiguousWorksheetSnafu { path }.fail(),
    }
}

// The data rows with their line number in the sheet. Blank rows are skipped.
fn data_rows(wrange: &Range<DataType>) -> impl Iterator<Item = (u64, &[DataType])> {
    wrange
        .rows()
        .enumerate()
        .skip(1)
        .map(|(idx, row)| ((idx + 1) as u64, row))
        .filter(|(_, row)| row.iter().any(|c| *c != DataType::Empty))
}

fn read_feedback_rows(wrange: &Range<DataType>, path: &str) -> ReportResult<Vec<FeedbackRecord>> {
    let mut res: Vec<FeedbackRecord> = Vec::new();
    for (lineno, row) in data_rows(wrange) {
        debug!("read_feedback_rows: lineno: {:?} row: {:?}", lineno, row);
        let account = required_str(row, 0, path, lineno)?;
        let timestamp = cell_timestamp(row.get(1), path, lineno)?;
        let overall = cell_str(row.get(2), lineno)?;
        let device = cell_str(row.get(3), lineno)?
            .as_deref()
            .and_then(normalize_reference_str);
        let mut questions: Vec<(Option<String>, Option<String>)> = Vec::new();
        let mut col = FEEDBACK_FIRST_QUESTION_COL;
        while col < row.len() {
            questions.push((cell_str(row.get(col), lineno)?, cell_str(row.get(col + 1), lineno)?));
            col += 2;
        }
        res.push(build_feedback(
            &account,
            timestamp,
            overall.as_deref(),
            &questions,
            device,
            &format!("{}: line {}", path, lineno),
        ));
    }
    Ok(res)
}

fn read_vote_rows(wrange: &Range<DataType>, path: &str) -> ReportResult<Vec<StandaloneVoteRecord>> {
    let mut res: Vec<StandaloneVoteRecord> = Vec::new();
    for (lineno, row) in data_rows(wrange) {
        debug!("read_vote_rows: lineno: {:?} row: {:?}", lineno, row);
        let account = required_str(row, 0, path, lineno)?;
        let timestamp = cell_timestamp(row.get(1), path, lineno)?;
        let category = required_str(row, 2, path, lineno)?;
        let question = cell_str(row.get(3), lineno)?;
        let device = cell_str(row.get(4), lineno)?
            .as_deref()
            .and_then(normalize_reference_str);
        let feedback_link = cell_str(row.get(5), lineno)?
            .as_deref()
            .and_then(normalize_reference_str);
        let vote = build_vote(
            &account,
            timestamp,
            &category,
            question.as_deref(),
            device,
            feedback_link,
        )
        .context(InvalidRecordSnafu { path, lineno })?;
        res.push(vote);
    }
    Ok(res)
}

fn required_str(row: &[DataType], column: usize, path: &str, lineno: u64) -> ReportResult<String> {
    cell_str(row.get(column), lineno)?.context(LineTooShortSnafu {
        path,
        lineno,
        column,
    })
}

/// The text of a cell. Numbers are accepted for identifiers.
fn cell_str(cell: Option<&DataType>, lineno: u64) -> ReportResult<Option<String>> {
    match cell {
        None | Some(DataType::Empty) => Ok(None),
        Some(DataType::String(s)) => Ok(Some(s.trim().to_string()).filter(|s| !s.is_empty())),
        Some(DataType::Int(i)) => Ok(Some(i.to_string())),
        Some(DataType::Float(f)) if f.fract() == 0.0 => Ok(Some(format!("{}", *f as i64))),
        Some(DataType::Float(f)) => Ok(Some(f.to_string())),
        Some(DataType::Bool(b)) => Ok(Some(b.to_string())),
        Some(c) => ExcelWrongCellTypeSnafu {
            lineno,
            content: format!("{:?}", c),
        }
        .fail(),
    }
}

fn cell_timestamp(
    cell: Option<&DataType>,
    path: &str,
    lineno: u64,
) -> ReportResult<chrono::DateTime<chrono::Utc>> {
    match cell {
        Some(DataType::String(s)) => parse_timestamp(s).context(InvalidRecordSnafu { path, lineno }),
        Some(DataType::DateTime(serial)) | Some(DataType::Float(serial)) => {
            excel_serial_to_timestamp(*serial).context(ExcelWrongCellTypeSnafu {
                lineno,
                content: format!("{:?}", serial),
            })
        }
        Some(c) => ExcelWrongCellTypeSnafu {
            lineno,
            content: format!("{:?}", c),
        }
        .fail(),
        None => LineTooShortSnafu {
            path,
            lineno,
            column: 1_usize,
        }
        .fail(),
    }
}
