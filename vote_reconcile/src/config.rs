// ********* Score model ***********

use chrono::{DateTime, Utc};
use std::error::Error;
use std::fmt::Display;
use std::str::FromStr;

/// The five sentiment categories a customer can express.
///
/// The ordering of the variants follows the score: `SuperDislike` is the lowest.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub enum Category {
    SuperDislike,
    Dislike,
    Neutral,
    Like,
    SuperLike,
}

impl Category {
    /// The order in which categories are reported in summaries.
    pub const REPORT_ORDER: [Category; 5] = [
        Category::SuperLike,
        Category::Like,
        Category::Neutral,
        Category::Dislike,
        Category::SuperDislike,
    ];

    /// The fixed score of a category, between 1 and 5.
    pub fn score(self) -> u32 {
        match self {
            Category::SuperDislike => 1,
            Category::Dislike => 2,
            Category::Neutral => 3,
            Category::Like => 4,
            Category::SuperLike => 5,
        }
    }

    /// Maps an average score back to a category.
    ///
    /// The thresholds are inclusive lower bounds, checked from the highest down.
    /// Any input maps to a category: values below 1.5 (and NaN) are `SuperDislike`.
    pub fn from_average(average: f64) -> Category {
        if average >= 4.5 {
            Category::SuperLike
        } else if average >= 3.5 {
            Category::Like
        } else if average >= 2.5 {
            Category::Neutral
        } else if average >= 1.5 {
            Category::Dislike
        } else {
            Category::SuperDislike
        }
    }

    /// The canonical name, as written in exports and reports.
    pub fn name(self) -> &'static str {
        match self {
            Category::SuperDislike => "superdislike",
            Category::Dislike => "dislike",
            Category::Neutral => "neutral",
            Category::Like => "like",
            Category::SuperLike => "superlike",
        }
    }

    /// The human label of the category.
    pub fn label(self) -> &'static str {
        match self {
            Category::SuperLike => "Very Satisfied",
            Category::Like => "Satisfied",
            Category::Neutral => "Neutral",
            Category::Dislike => "Dissatisfied",
            Category::SuperDislike => "Very Dissatisfied",
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Category {
    type Err = RecordErrors;

    /// Case-insensitive. Separators (`_`, `-`, spaces) are ignored so that
    /// `super_like` and `Super Like` are both understood.
    fn from_str(s: &str) -> Result<Category, RecordErrors> {
        let compact: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_lowercase();
        match compact.as_str() {
            "superdislike" => Ok(Category::SuperDislike),
            "dislike" => Ok(Category::Dislike),
            "neutral" => Ok(Category::Neutral),
            "like" => Ok(Category::Like),
            "superlike" => Ok(Category::SuperLike),
            _ => Err(RecordErrors::UnknownCategory(s.to_string())),
        }
    }
}

/// The human label for an average score. `None` (no votes) is reported as "N/A".
pub fn satisfaction_label(average: Option<f64>) -> &'static str {
    match average {
        Some(avg) => Category::from_average(avg).label(),
        None => "N/A",
    }
}

// ********* Input data structures ***********

/// The form of an account name used for matching: accounts differing only by case are the same.
pub fn account_key(account: &str) -> String {
    account.to_lowercase()
}

/// One answer inside a feedback submission.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct QuestionVote {
    pub question: Option<String>,
    pub category: Option<Category>,
}

/// A structured feedback submission.
///
/// The device identifier is already canonical: the readers normalize the
/// various legacy device shapes before building this record.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct FeedbackRecord {
    pub account: String,
    pub timestamp: DateTime<Utc>,
    pub overall: Option<Category>,
    pub questions: Vec<QuestionVote>,
    pub device: Option<String>,
}

/// A single-tap vote, recorded without a form.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct StandaloneVoteRecord {
    pub account: String,
    pub timestamp: DateTime<Utc>,
    pub category: Category,
    pub question: Option<String>,
    pub device: Option<String>,
    /// Reserved for an authoritative join with a feedback submission.
    /// Linked votes are always represented through their feedback.
    pub feedback_link: Option<String>,
}

impl StandaloneVoteRecord {
    pub fn is_linked(&self) -> bool {
        self.feedback_link.is_some()
    }
}

// ******** Output data structures *********

/// Which recording path produced a signal.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum SignalOrigin {
    Feedback,
    Standalone,
}

/// One customer sentiment event, after reconciliation.
#[derive(PartialEq, Debug, Clone)]
pub struct VoteSignal {
    pub category: Category,
    /// Between 1.0 and 5.0. Feedback signals carry the average of their answers.
    pub score: f64,
    pub timestamp: DateTime<Utc>,
    pub origin: SignalOrigin,
}

// ********* Queries **********

/// An inclusive range of timestamps. A missing bound is unbounded on that side.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub const UNBOUNDED: DateRange = DateRange {
        start: None,
        end: None,
    };

    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> DateRange {
        DateRange { start, end }
    }

    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| s <= *ts) && self.end.map_or(true, |e| *ts <= e)
    }

    /// True when both bounds are set and fall on the same UTC calendar day.
    pub fn is_single_day(&self) -> bool {
        match (self.start, self.end) {
            (Some(s), Some(e)) => s.date_naive() == e.date_naive(),
            _ => false,
        }
    }
}

/// The resolution of the timeline buckets.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum Granularity {
    Hour,
    Day,
    Month,
}

impl Granularity {
    pub fn name(self) -> &'static str {
        match self {
            Granularity::Hour => "hour",
            Granularity::Day => "day",
            Granularity::Month => "month",
        }
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Granularity, String> {
        match s.trim().to_lowercase().as_str() {
            "hour" | "hourly" => Ok(Granularity::Hour),
            "day" | "daily" => Ok(Granularity::Day),
            "month" | "monthly" => Ok(Granularity::Month),
            x => Err(format!("unknown granularity: {:?}", x)),
        }
    }
}

// ********* Configuration **********

/// The tolerances of the duplicate detection between the two recording paths.
///
/// A tap vote and a form submission for the same visit are expected to happen
/// within `visit_window_secs` of each other and to express the same sentiment,
/// up to `score_tolerance`.
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct ReconcileRules {
    pub visit_window_secs: i64,
    pub score_tolerance: f64,
}

impl ReconcileRules {
    pub const DEFAULT_RULES: ReconcileRules = ReconcileRules {
        visit_window_secs: 5 * 60,
        score_tolerance: 0.51,
    };
}

impl Default for ReconcileRules {
    fn default() -> Self {
        ReconcileRules::DEFAULT_RULES
    }
}

// ********* Collaborators **********

/// Read access to the two record sets of an account.
///
/// Implementations filter by account and by the inclusive date range, and
/// return fully materialized snapshots. Errors are passed through unchanged by
/// the engine.
pub trait RecordReader {
    type Error;

    fn read_feedback(
        &self,
        account: &str,
        range: &DateRange,
    ) -> Result<Vec<FeedbackRecord>, Self::Error>;

    fn read_standalone_votes(
        &self,
        account: &str,
        range: &DateRange,
    ) -> Result<Vec<StandaloneVoteRecord>, Self::Error>;
}

/// Errors found while turning raw values into records.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum RecordErrors {
    UnknownCategory(String),
    InvalidTimestamp(String),
}

impl Error for RecordErrors {}

impl Display for RecordErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordErrors::UnknownCategory(s) => write!(f, "unknown vote category {:?}", s),
            RecordErrors::InvalidTimestamp(s) => write!(f, "invalid timestamp {:?}", s),
        }
    }
}
