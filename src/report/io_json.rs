// Record exports in JSON.

use serde::{Deserialize, Serialize};

use crate::report::{
    io_common::{build_feedback, build_vote, normalize_reference, parse_timestamp},
    *,
};

#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct JsonExport {
    #[serde(default)]
    pub feedback: Vec<JsonFeedback>,
    #[serde(default)]
    pub votes: Vec<JsonVote>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct JsonQuestionVote {
    pub question: Option<String>,
    pub vote: Option<String>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct JsonFeedback {
    pub account: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    pub overall: Option<String>,
    #[serde(default)]
    pub votes: Vec<JsonQuestionVote>,
    // Legacy exports embed the device in several shapes.
    #[serde(default)]
    pub device: JSValue,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct JsonVote {
    pub account: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
    pub vote: String,
    pub question: Option<String>,
    #[serde(default)]
    pub device: JSValue,
    #[serde(rename = "feedbackId", default)]
    pub feedback_id: JSValue,
}

pub fn read_json_export(path: &str, kind: RecordKind) -> ReportResult<MemoryRecords> {
    let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    let export: JsonExport =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    debug!(
        "read_json_export: {:?}: {} feedback entries, {} vote entries",
        path,
        export.feedback.len(),
        export.votes.len()
    );
    convert_export(path, &export, kind)
}

fn convert_export(path: &str, export: &JsonExport, kind: RecordKind) -> ReportResult<MemoryRecords> {
    let mut feedback: Vec<FeedbackRecord> = Vec::new();
    if kind.has_feedback() {
        for (idx, jf) in export.feedback.iter().enumerate() {
            let lineno = (idx + 1) as u64;
            let timestamp =
                parse_timestamp(&jf.created_at).context(InvalidRecordSnafu { path, lineno })?;
            let questions: Vec<(Option<String>, Option<String>)> = jf
                .votes
                .iter()
                .map(|qv| (qv.question.clone(), qv.vote.clone()))
                .collect();
            feedback.push(build_feedback(
                &jf.account,
                timestamp,
                jf.overall.as_deref(),
                &questions,
                normalize_reference(&jf.device),
                &format!("{}: feedback {}", path, lineno),
            ));
        }
    }

    let mut votes: Vec<StandaloneVoteRecord> = Vec::new();
    if kind.has_votes() {
        for (idx, jv) in export.votes.iter().enumerate() {
            let lineno = (idx + 1) as u64;
            let timestamp =
                parse_timestamp(&jv.created_at).context(InvalidRecordSnafu { path, lineno })?;
            let vote = build_vote(
                &jv.account,
                timestamp,
                &jv.vote,
                jv.question.as_deref(),
                normalize_reference(&jv.device),
                normalize_reference(&jv.feedback_id),
            )
            .context(InvalidRecordSnafu { path, lineno })?;
            votes.push(vote);
        }
    }
    Ok(MemoryRecords::new(feedback, votes))
}

/// The canonical export of a set of records.
pub fn to_json_export(records: &MemoryRecords) -> JsonExport {
    let ts = |t: &chrono::DateTime<chrono::Utc>| t.to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let reference = |r: &Option<String>| match r {
        Some(s) => JSValue::String(s.clone()),
        None => JSValue::Null,
    };
    JsonExport {
        feedback: records
            .feedback()
            .iter()
            .map(|f| JsonFeedback {
                account: f.account.clone(),
                created_at: ts(&f.timestamp),
                overall: f.overall.map(|c| c.name().to_string()),
                votes: f
                    .questions
                    .iter()
                    .map(|q| JsonQuestionVote {
                        question: q.question.clone(),
                        vote: q.category.map(|c| c.name().to_string()),
                    })
                    .collect(),
                device: reference(&f.device),
            })
            .collect(),
        votes: records
            .votes()
            .iter()
            .map(|v| JsonVote {
                account: v.account.clone(),
                created_at: ts(&v.timestamp),
                vote: v.category.name().to_string(),
                question: v.question.clone(),
                device: reference(&v.device),
                feedback_id: reference(&v.feedback_link),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn legacy_shapes_are_normalized() {
        let js = json!({
            "feedback": [
                {"account": "acme", "createdAt": "2024-01-01T10:00:00Z", "overall": "LIKE",
                 "votes": [{"question": "Service", "vote": "super_like"}, {"question": "Food"}],
                 "device": {"deviceId": "D1"}},
                {"account": "acme", "createdAt": "2024-01-01 11:00:00", "device": 12}
            ],
            "votes": [
                {"account": "acme", "createdAt": "2024-01-01T10:03:00Z", "vote": "like",
                 "device": {"_id": "D1"}, "feedbackId": ""},
                {"account": "acme", "createdAt": "2024-01-01T10:04:00Z", "vote": "like",
                 "feedbackId": {"id": "fb-1"}}
            ]
        });
        let export: JsonExport = serde_json::from_value(js).unwrap();
        let records = convert_export("test.json", &export, RecordKind::All).unwrap();

        let fb = records.feedback();
        assert_eq!(fb.len(), 2);
        assert_eq!(fb[0].device, Some("D1".to_string()));
        assert_eq!(fb[0].overall, Some(Category::Like));
        assert_eq!(fb[0].questions[0].category, Some(Category::SuperLike));
        assert_eq!(fb[0].questions[1].category, None);
        assert_eq!(fb[1].device, Some("12".to_string()));
        assert_eq!(
            fb[1].timestamp,
            Utc.with_ymd_and_hms(2024, 1, 1, 11, 0, 0).unwrap()
        );

        let votes = records.votes();
        assert_eq!(votes[0].device, Some("D1".to_string()));
        assert_eq!(votes[0].feedback_link, None);
        assert_eq!(votes[1].device, None);
        assert_eq!(votes[1].feedback_link, Some("fb-1".to_string()));

        let only_votes = convert_export("test.json", &export, RecordKind::Votes).unwrap();
        assert!(only_votes.feedback().is_empty());
        assert_eq!(only_votes.votes().len(), 2);
    }

    #[test]
    fn bad_timestamp_names_the_record() {
        let js = json!({"votes": [
            {"account": "acme", "createdAt": "2024-01-01T10:03:00Z", "vote": "like"},
            {"account": "acme", "createdAt": "soon", "vote": "like"}
        ]});
        let export: JsonExport = serde_json::from_value(js).unwrap();
        let res = convert_export("test.json", &export, RecordKind::All);
        assert!(matches!(
            res,
            Err(ReportError::InvalidRecord {
                lineno: 2,
                source: RecordErrors::InvalidTimestamp(_),
                ..
            })
        ));
    }

    #[test]
    fn canonical_export() {
        let js = json!({"votes": [
            {"account": "acme", "createdAt": "2024-01-01 10:03:00", "vote": "SUPERLIKE",
             "device": "{\"deviceId\": \"D4\"}"}
        ]});
        let export: JsonExport = serde_json::from_value(js).unwrap();
        let records = convert_export("test.json", &export, RecordKind::All).unwrap();
        let canonical = to_json_export(&records);
        assert_eq!(
            serde_json::to_value(&canonical).unwrap(),
            json!({
                "feedback": [],
                "votes": [
                    {"account": "acme", "createdAt": "2024-01-01T10:03:00Z", "vote": "superlike",
                     "question": null, "device": "D4", "feedbackId": null}
                ]
            })
        );
    }
}
