use std::convert::Infallible;

use chrono::{DateTime, Utc};

pub use crate::config::*;

/// A builder for in-memory record sets.
///
/// Categories are given as strings and parsed here, so that unknown values are
/// rejected before reaching the engine.
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use vote_reconcile::builder::Builder;
/// use vote_reconcile::{reconcile, DateRange, ReconcileRules, RecordErrors};
///
/// let ts = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
/// let mut builder = Builder::new();
/// builder.add_feedback("acme", ts, Some("like"), &[], Some("D1"))?;
/// builder.add_vote("acme", ts, "like", None, Some("D1"), None)?;
/// let records = builder.build();
///
/// let signals = reconcile(&records, "acme", &DateRange::UNBOUNDED, &ReconcileRules::DEFAULT_RULES);
/// assert_eq!(signals.map(|s| s.len()), Ok(1));
/// # Ok::<(), RecordErrors>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Builder {
    pub(crate) _feedback: Vec<FeedbackRecord>,
    pub(crate) _votes: Vec<StandaloneVoteRecord>,
}

fn parse_optional(category: Option<&str>) -> Result<Option<Category>, RecordErrors> {
    category.map(|s| s.parse::<Category>()).transpose()
}

impl Builder {
    pub fn new() -> Builder {
        Builder::default()
    }

    /// Adds a feedback submission.
    ///
    /// questions: the (question, category) pairs of the submission, in order.
    pub fn add_feedback(
        &mut self,
        account: &str,
        timestamp: DateTime<Utc>,
        overall: Option<&str>,
        questions: &[(Option<&str>, Option<&str>)],
        device: Option<&str>,
    ) -> Result<(), RecordErrors> {
        let mut qvs: Vec<QuestionVote> = Vec::new();
        for (q, c) in questions.iter() {
            qvs.push(QuestionVote {
                question: q.map(|s| s.to_string()),
                category: parse_optional(*c)?,
            });
        }
        self.add_feedback_2(&FeedbackRecord {
            account: account.to_string(),
            timestamp,
            overall: parse_optional(overall)?,
            questions: qvs,
            device: device.map(|s| s.to_string()),
        })
    }

    pub fn add_feedback_2(&mut self, record: &FeedbackRecord) -> Result<(), RecordErrors> {
        self._feedback.push(record.clone());
        Ok(())
    }

    /// Adds a single-tap vote.
    pub fn add_vote(
        &mut self,
        account: &str,
        timestamp: DateTime<Utc>,
        category: &str,
        question: Option<&str>,
        device: Option<&str>,
        feedback_link: Option<&str>,
    ) -> Result<(), RecordErrors> {
        self.add_vote_2(&StandaloneVoteRecord {
            account: account.to_string(),
            timestamp,
            category: category.parse::<Category>()?,
            question: question.map(|s| s.to_string()),
            device: device.map(|s| s.to_string()),
            feedback_link: feedback_link.map(|s| s.to_string()),
        })
    }

    pub fn add_vote_2(&mut self, record: &StandaloneVoteRecord) -> Result<(), RecordErrors> {
        self._votes.push(record.clone());
        Ok(())
    }

    pub fn build(self) -> MemoryRecords {
        MemoryRecords::new(self._feedback, self._votes)
    }
}

/// Record sets held in memory.
///
/// Accounts are matched without regard to case.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct MemoryRecords {
    feedback: Vec<FeedbackRecord>,
    votes: Vec<StandaloneVoteRecord>,
}

impl MemoryRecords {
    pub fn new(feedback: Vec<FeedbackRecord>, votes: Vec<StandaloneVoteRecord>) -> MemoryRecords {
        MemoryRecords { feedback, votes }
    }

    pub fn feedback(&self) -> &[FeedbackRecord] {
        &self.feedback
    }

    pub fn votes(&self) -> &[StandaloneVoteRecord] {
        &self.votes
    }

    pub fn extend(&mut self, other: MemoryRecords) {
        self.feedback.extend(other.feedback);
        self.votes.extend(other.votes);
    }
}

impl RecordReader for MemoryRecords {
    type Error = Infallible;

    fn read_feedback(
        &self,
        account: &str,
        range: &DateRange,
    ) -> Result<Vec<FeedbackRecord>, Infallible> {
        let key = account_key(account);
        Ok(self
            .feedback
            .iter()
            .filter(|r| account_key(&r.account) == key && range.contains(&r.timestamp))
            .cloned()
            .collect())
    }

    fn read_standalone_votes(
        &self,
        account: &str,
        range: &DateRange,
    ) -> Result<Vec<StandaloneVoteRecord>, Infallible> {
        let key = account_key(account);
        Ok(self
            .votes
            .iter()
            .filter(|r| account_key(&r.account) == key && range.contains(&r.timestamp))
            .cloned()
            .collect())
    }
}
