// Rewrites the records of the sources into the canonical JSON export.
//
// Device and feedback references are stored as plain identifiers, categories by their
// lowercase name and timestamps in UTC. The output can be read back with the "json" provider.

use crate::report::{io_json::to_json_export, *};

pub fn run_migration(reader: &SourceReader, out_path: &str) -> ReportResult<JSValue> {
    let records = reader.load_all()?;
    let mut feedback = records.feedback().to_vec();
    let mut votes = records.votes().to_vec();
    feedback.sort_by_key(|f| f.timestamp);
    votes.sort_by_key(|v| v.timestamp);
    let num_feedback = feedback.len();
    let num_votes = votes.len();

    let export = to_json_export(&MemoryRecords::new(feedback, votes));
    let pretty = serde_json::to_string_pretty(&export).context(WritingJsonSnafu {})?;
    info!(
        "Writing {} feedback records and {} votes to {:?}",
        num_feedback, num_votes, out_path
    );
    fs::write(out_path, pretty).context(WritingFileSnafu { path: out_path })?;
    Ok(json!({
        "migrated": {
            "feedback": num_feedback,
            "votes": num_votes,
        }
    }))
}
