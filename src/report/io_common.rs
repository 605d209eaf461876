// Normalization applied to every record at the read boundary.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::report::*;

// The fields that may hold the identifier in the object form of a reference.
const REFERENCE_ID_FIELDS: [&str; 4] = ["deviceId", "id", "_id", "name"];

/// Turns a device (or feedback) reference, in any of its legacy shapes, into a canonical identifier.
///
/// Accepted shapes: a string, a number, an object with one of the fields
/// `deviceId`, `id`, `_id` or `name`, or a string containing such an object in JSON.
/// Blank references are absent.
pub fn normalize_reference(v: &JSValue) -> Option<String> {
    match v {
        JSValue::String(s) => normalize_reference_str(s),
        JSValue::Number(n) => Some(n.to_string()),
        JSValue::Object(obj) => REFERENCE_ID_FIELDS
            .iter()
            .filter_map(|f| obj.get(*f))
            .find_map(normalize_reference),
        _ => None,
    }
}

pub fn normalize_reference_str(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        return None;
    }
    if t.starts_with('{') {
        if let Ok(js) = serde_json::from_str::<JSValue>(t) {
            return normalize_reference(&js);
        }
    }
    Some(t.to_string())
}

pub fn non_blank(s: Option<&str>) -> Option<String> {
    s.map(|x| x.trim()).filter(|x| !x.is_empty()).map(|x| x.to_string())
}

/// Parses a record timestamp. Timestamps without an offset are in UTC.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, RecordErrors> {
    let t = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(t, fmt) {
            return Ok(Utc.from_utc_datetime(&ndt));
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(t, "%Y-%m-%d") {
        if let Some(ndt) = d.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&ndt));
        }
    }
    Err(RecordErrors::InvalidTimestamp(s.to_string()))
}

/// Converts a spreadsheet serial date (days since 1899-12-30) to a timestamp.
pub fn excel_serial_to_timestamp(serial: f64) -> Option<DateTime<Utc>> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round() as i64;
    let ndt = epoch.checked_add_signed(Duration::milliseconds(millis))?;
    Some(Utc.from_utc_datetime(&ndt))
}

/// Parses an optional category. Unknown values are logged and treated as absent.
pub fn parse_optional_category(raw: Option<&str>, context: &str) -> Option<Category> {
    let s = non_blank(raw)?;
    match s.parse::<Category>() {
        Ok(c) => Some(c),
        Err(e) => {
            warn!("{}: ignoring {}", context, e);
            None
        }
    }
}

/// Builds a feedback record from raw fields. Blank answers (no question, no vote) are dropped.
pub fn build_feedback(
    account: &str,
    timestamp: DateTime<Utc>,
    overall: Option<&str>,
    questions: &[(Option<String>, Option<String>)],
    device: Option<String>,
    context: &str,
) -> FeedbackRecord {
    let questions: Vec<QuestionVote> = questions
        .iter()
        .filter_map(|(q, v)| {
            let question = non_blank(q.as_deref());
            let vote = non_blank(v.as_deref());
            if question.is_none() && vote.is_none() {
                return None;
            }
            Some(QuestionVote {
                question,
                category: parse_optional_category(vote.as_deref(), context),
            })
        })
        .collect();
    FeedbackRecord {
        account: account.trim().to_string(),
        timestamp,
        overall: parse_optional_category(overall, context),
        questions,
        device,
    }
}

/// Builds a standalone vote from raw fields. The category is required.
pub fn build_vote(
    account: &str,
    timestamp: DateTime<Utc>,
    category: &str,
    question: Option<&str>,
    device: Option<String>,
    feedback_link: Option<String>,
) -> Result<StandaloneVoteRecord, RecordErrors> {
    Ok(StandaloneVoteRecord {
        account: account.trim().to_string(),
        timestamp,
        category: category.trim().parse::<Category>()?,
        question: non_blank(question),
        device,
        feedback_link,
    })
}

/// Parses a date of the query. A plain date covers the whole day: it is the
/// first millisecond of the day for a start date and the last one for an end date.
pub fn parse_query_date(s: &str, end_of_day: bool) -> ReportResult<DateTime<Utc>> {
    let t = s.trim();
    if let Ok(d) = NaiveDate::parse_from_str(t, "%Y-%m-%d") {
        let ndt = if end_of_day {
            d.and_hms_milli_opt(23, 59, 59, 999)
        } else {
            d.and_hms_opt(0, 0, 0)
        };
        return ndt
            .map(|x| Utc.from_utc_datetime(&x))
            .context(InvalidDateSnafu { value: t });
    }
    DateTime::parse_from_rfc3339(t)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .context(InvalidDateSnafu { value: t })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_shapes() {
        assert_eq!(normalize_reference(&json!("D1")), Some("D1".to_string()));
        assert_eq!(normalize_reference(&json!("  D1 ")), Some("D1".to_string()));
        assert_eq!(normalize_reference(&json!(42)), Some("42".to_string()));
        assert_eq!(
            normalize_reference(&json!({"deviceId": "D1", "name": "Lobby"})),
            Some("D1".to_string())
        );
        assert_eq!(
            normalize_reference(&json!({"_id": {"id": "D7"}})),
            Some("D7".to_string())
        );
        assert_eq!(
            normalize_reference(&json!({"name": "Lobby"})),
            Some("Lobby".to_string())
        );
        assert_eq!(
            normalize_reference(&json!(r#"{"id": 3}"#)),
            Some("3".to_string())
        );
        assert_eq!(normalize_reference(&json!("")), None);
        assert_eq!(normalize_reference(&json!(null)), None);
        assert_eq!(normalize_reference(&json!({"serial": "x"})), None);
    }

    #[test]
    fn timestamps() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 10, 3, 0).unwrap();
        assert_eq!(parse_timestamp("2024-01-01T10:03:00Z"), Ok(expected));
        assert_eq!(parse_timestamp("2024-01-01T11:03:00+01:00"), Ok(expected));
        assert_eq!(parse_timestamp("2024-01-01 10:03:00"), Ok(expected));
        assert_eq!(parse_timestamp("2024-01-01 10:03"), Ok(expected));
        assert_eq!(
            parse_timestamp("2024-01-01"),
            Ok(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(
            parse_timestamp("yesterday"),
            Err(RecordErrors::InvalidTimestamp("yesterday".to_string()))
        );
    }

    #[test]
    fn excel_serial_dates() {
        // 45292 is 2024-01-01, 0.5 is noon.
        assert_eq!(
            excel_serial_to_timestamp(45292.5),
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap())
        );
        assert_eq!(excel_serial_to_timestamp(-1.0), None);
    }

    #[test]
    fn query_dates_cover_whole_days() {
        let start = parse_query_date("2024-01-01", false).unwrap();
        let end = parse_query_date("2024-01-01", true).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(
            end,
            Utc.with_ymd_and_hms(2024, 1, 1, 23, 59, 59).unwrap() + Duration::milliseconds(999)
        );
        assert!(DateRange::new(Some(start), Some(end)).is_single_day());
        assert!(parse_query_date("2024-01-01T08:00:00Z", false).is_ok());
        assert!(matches!(
            parse_query_date("01/02/2024", false),
            Err(ReportError::InvalidDate { .. })
        ));
    }

    #[test]
    fn feedback_fields() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let fb = build_feedback(
            " acme ",
            ts,
            Some("great"),
            &[
                (Some("Service".to_string()), Some("Like".to_string())),
                (Some("".to_string()), Some("".to_string())),
                (None, Some("meh".to_string())),
            ],
            Some("D1".to_string()),
            "test",
        );
        assert_eq!(fb.account, "acme");
        assert_eq!(fb.overall, None);
        assert_eq!(
            fb.questions,
            vec![
                QuestionVote {
                    question: Some("Service".to_string()),
                    category: Some(Category::Like),
                },
                QuestionVote {
                    question: None,
                    category: None,
                },
            ]
        );
    }

    #[test]
    fn vote_fields() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let v = build_vote("acme", ts, " SuperLike ", Some(" "), None, None).unwrap();
        assert_eq!(v.category, Category::SuperLike);
        assert_eq!(v.question, None);
        assert!(build_vote("acme", ts, "", None, None, None).is_err());
    }
}
