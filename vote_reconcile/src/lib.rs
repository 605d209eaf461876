mod aggregate;
pub mod builder;
mod config;
pub mod manual;

use log::{debug, info};

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

pub use crate::aggregate::*;
pub use crate::config::*;

// **** Private structures ****

// What a feedback submission looks like to the duplicate detection.
#[derive(PartialEq, Debug, Clone)]
struct DedupeCandidate {
    timestamp: DateTime<Utc>,
    derived: Category,
    average_score: f64,
    // The overall category as submitted, not the derived one.
    overall: Option<Category>,
    question: Option<String>,
}

/// The duplicate candidates of a request, grouped by account and device.
///
/// Built once from the feedback submissions and never modified afterwards.
#[derive(Debug, Clone, Default)]
struct DedupeIndex {
    by_key: HashMap<String, Vec<DedupeCandidate>>,
}

impl DedupeIndex {
    fn build(entries: Vec<(String, DedupeCandidate)>) -> DedupeIndex {
        let mut by_key: HashMap<String, Vec<DedupeCandidate>> = HashMap::new();
        for (key, cand) in entries {
            by_key.entry(key).or_default().push(cand);
        }
        DedupeIndex { by_key }
    }

    fn lookup(&self, account: &str, device: Option<&str>) -> &[DedupeCandidate] {
        self.by_key
            .get(&dedupe_key(account, device))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    fn num_candidates(&self) -> usize {
        self.by_key.values().map(|v| v.len()).sum()
    }
}

/// The composite key grouping duplicate candidates: the lowercased account and the device.
fn dedupe_key(account: &str, device: Option<&str>) -> String {
    format!("{}::{}", account_key(account), device.unwrap_or(""))
}

// Collects the scores of a submission. The answers to the individual
// questions take precedence: the overall category is only used when no
// question carries a category.
fn collect_scores(record: &FeedbackRecord) -> Vec<f64> {
    let question_scores: Vec<f64> = record
        .questions
        .iter()
        .filter_map(|q| q.category.map(|c| c.score() as f64))
        .collect();
    if !question_scores.is_empty() {
        question_scores
    } else if let Some(c) = record.overall {
        vec![c.score() as f64]
    } else {
        vec![]
    }
}

// The question of a submission, when it can be told apart: all the scored
// answers refer to the same question.
fn candidate_question(record: &FeedbackRecord) -> Option<String> {
    let questions: HashSet<&str> = record
        .questions
        .iter()
        .filter(|q| q.category.is_some())
        .filter_map(|q| q.question.as_deref())
        .filter(|s| !s.is_empty())
        .collect();
    let num_scored = record
        .questions
        .iter()
        .filter(|q| q.category.is_some())
        .count();
    let num_with_text = record
        .questions
        .iter()
        .filter(|q| q.category.is_some() && q.question.as_deref().map_or(false, |s| !s.is_empty()))
        .count();
    match questions.iter().next() {
        Some(q) if questions.len() == 1 && num_with_text == num_scored => Some(q.to_string()),
        _ => None,
    }
}

fn derive(record: &FeedbackRecord) -> Option<(VoteSignal, DedupeCandidate)> {
    let scores = collect_scores(record);
    if scores.is_empty() {
        // No measurable sentiment in this submission.
        return None;
    }
    let average_score = scores.iter().sum::<f64>() / scores.len() as f64;
    let derived = Category::from_average(average_score);
    let signal = VoteSignal {
        category: derived,
        score: average_score,
        timestamp: record.timestamp,
        origin: SignalOrigin::Feedback,
    };
    let candidate = DedupeCandidate {
        timestamp: record.timestamp,
        derived,
        average_score,
        overall: record.overall,
        question: candidate_question(record),
    };
    Some((signal, candidate))
}

/// Converts a feedback submission into a signal.
///
/// The score is the average of the categories given to the individual
/// questions, or the overall category when no question was answered. A
/// submission without any category produces no signal.
pub fn derive_signal(record: &FeedbackRecord) -> Option<VoteSignal> {
    derive(record).map(|(signal, _)| signal)
}

fn questions_compatible(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(x), Some(y)) => x == y,
        _ => true,
    }
}

// True if the vote records the same visit as the candidate submission.
fn is_duplicate_of(
    vote: &StandaloneVoteRecord,
    vote_score: f64,
    cand: &DedupeCandidate,
    rules: &ReconcileRules,
) -> bool {
    let delta_ms = (cand.timestamp - vote.timestamp).num_milliseconds().abs();
    if delta_ms > rules.visit_window_secs.saturating_mul(1000) {
        return false;
    }
    if !questions_compatible(cand.question.as_deref(), vote.question.as_deref()) {
        return false;
    }
    cand.overall == Some(vote.category)
        || (cand.average_score - vote_score).abs() <= rules.score_tolerance
}

/// Reconciles two snapshots of records into one signal per customer interaction.
///
/// All the submissions that carry a sentiment are kept. A standalone vote is
/// dropped when it is linked to a submission, or when a submission on the same
/// account and device looks like the same visit (see `ReconcileRules`).
/// The order of the output is not specified.
pub fn reconcile_records(
    feedback: &[FeedbackRecord],
    votes: &[StandaloneVoteRecord],
    rules: &ReconcileRules,
) -> Vec<VoteSignal> {
    let mut signals: Vec<VoteSignal> = Vec::new();
    let mut entries: Vec<(String, DedupeCandidate)> = Vec::new();
    let mut num_silent = 0;
    for record in feedback.iter() {
        match derive(record) {
            Some((signal, cand)) => {
                signals.push(signal);
                entries.push((dedupe_key(&record.account, record.device.as_deref()), cand));
            }
            None => {
                num_silent += 1;
            }
        }
    }
    let index = DedupeIndex::build(entries);
    debug!(
        "reconcile_records: {} feedback signals, {} submissions without sentiment, {} candidates",
        signals.len(),
        num_silent,
        index.num_candidates()
    );

    let mut num_linked = 0;
    let mut num_duplicates = 0;
    for vote in votes.iter() {
        if vote.is_linked() {
            num_linked += 1;
            continue;
        }
        let score = vote.category.score() as f64;
        let candidates = index.lookup(&vote.account, vote.device.as_deref());
        if let Some(cand) = candidates
            .iter()
            .find(|cand| is_duplicate_of(vote, score, cand, rules))
        {
            debug!(
                "reconcile_records: vote {} at {} on device {:?} duplicates feedback {} ({:.2}) at {}",
                vote.category,
                vote.timestamp,
                vote.device,
                cand.derived,
                cand.average_score,
                cand.timestamp
            );
            num_duplicates += 1;
            continue;
        }
        signals.push(VoteSignal {
            category: vote.category,
            score,
            timestamp: vote.timestamp,
            origin: SignalOrigin::Standalone,
        });
    }

    info!(
        "Reconciled {} submissions and {} standalone votes into {} signals ({} linked votes, {} duplicates dropped)",
        feedback.len(),
        votes.len(),
        signals.len(),
        num_linked,
        num_duplicates
    );
    signals
}

/// Reads the records of an account and reconciles them.
///
/// Read failures are returned as they are. The engine does not retry.
pub fn reconcile<R: RecordReader>(
    reader: &R,
    account: &str,
    range: &DateRange,
    rules: &ReconcileRules,
) -> Result<Vec<VoteSignal>, R::Error> {
    let feedback = reader.read_feedback(account, range)?;
    let votes = reader.read_standalone_votes(account, range)?;
    info!(
        "Processing account {:?}: {} submissions, {} standalone votes",
        account,
        feedback.len(),
        votes.len()
    );
    Ok(reconcile_records(&feedback, &votes, rules))
}
