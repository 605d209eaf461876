use log::debug;

use chrono::{Datelike, Timelike};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use crate::config::*;

// ******** Summary *********

#[derive(PartialEq, Debug, Clone)]
pub struct CategoryCount {
    pub category: Category,
    pub count: u64,
    /// Share of the total, between 0 and 100. Zero when there are no signals.
    pub percentage: f64,
}

/// Statistics over a set of reconciled signals.
#[derive(PartialEq, Debug, Clone)]
pub struct Summary {
    pub total_count: u64,
    /// One entry per category, in `Category::REPORT_ORDER`. Categories without
    /// signals are present with a count of zero.
    pub counts: Vec<CategoryCount>,
    pub average_score: Option<f64>,
    pub average_label: &'static str,
}

impl Summary {
    pub fn count_of(&self, category: Category) -> u64 {
        self.counts
            .iter()
            .find(|cc| cc.category == category)
            .map(|cc| cc.count)
            .unwrap_or(0)
    }
}

/// Counts the signals per category and computes their average score.
pub fn summarize(signals: &[VoteSignal]) -> Summary {
    let mut tally: BTreeMap<Category, u64> = BTreeMap::new();
    for s in signals.iter() {
        *tally.entry(s.category).or_insert(0) += 1;
    }
    let total_count = signals.len() as u64;

    // Summing in a fixed order keeps the average identical whatever the order of the signals.
    let mut scores: Vec<f64> = signals.iter().map(|s| s.score).collect();
    scores.sort_by(|a, b| a.total_cmp(b));
    let average_score = if total_count == 0 {
        None
    } else {
        Some(scores.iter().sum::<f64>() / total_count as f64)
    };

    let counts: Vec<CategoryCount> = Category::REPORT_ORDER
        .iter()
        .map(|c| {
            let count = tally.get(c).cloned().unwrap_or(0);
            let percentage = if total_count == 0 {
                0.0
            } else {
                count as f64 * 100.0 / total_count as f64
            };
            CategoryCount {
                category: *c,
                count,
                percentage,
            }
        })
        .collect();

    debug!(
        "summarize: {} signals, average {:?}",
        total_count, average_score
    );
    Summary {
        total_count,
        counts,
        average_score,
        average_label: satisfaction_label(average_score),
    }
}

// ******** Timeline *********

/// A partial date identifying a timeline bucket.
///
/// Comparisons go field by field, a missing day or hour counting as 0.
#[derive(Debug, Clone, Copy)]
pub struct TimeBucketKey {
    pub year: i32,
    pub month: u32,
    pub day: Option<u32>,
    pub hour: Option<u32>,
}

impl TimeBucketKey {
    pub fn of<T: Datelike + Timelike>(ts: &T, granularity: Granularity) -> TimeBucketKey {
        let (day, hour) = match granularity {
            Granularity::Month => (None, None),
            Granularity::Day => (Some(ts.day()), None),
            Granularity::Hour => (Some(ts.day()), Some(ts.hour())),
        };
        TimeBucketKey {
            year: ts.year(),
            month: ts.month(),
            day,
            hour,
        }
    }

    fn fields(&self) -> (i32, u32, u32, u32) {
        (
            self.year,
            self.month,
            self.day.unwrap_or(0),
            self.hour.unwrap_or(0),
        )
    }

    /// `2024-01`, `2024-01-31` or `2024-01-31 09:00` depending on the fields present.
    pub fn label(&self) -> String {
        match (self.day, self.hour) {
            (Some(d), Some(h)) => format!("{:04}-{:02}-{:02} {:02}:00", self.year, self.month, d, h),
            (Some(d), None) => format!("{:04}-{:02}-{:02}", self.year, self.month, d),
            _ => format!("{:04}-{:02}", self.year, self.month),
        }
    }
}

impl PartialEq for TimeBucketKey {
    fn eq(&self, other: &Self) -> bool {
        self.fields() == other.fields()
    }
}

impl Eq for TimeBucketKey {}

impl Hash for TimeBucketKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fields().hash(state);
    }
}

impl PartialOrd for TimeBucketKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeBucketKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.fields().cmp(&other.fields())
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct TimelineBucket {
    pub key: TimeBucketKey,
    pub count: u64,
}

/// Counts the signals per time bucket, in chronological order.
///
/// Buckets are in UTC. Only the buckets that contain a signal are returned.
/// Nothing here restricts hourly timelines to a single day: this is up to the caller.
pub fn build_timeline(signals: &[VoteSignal], granularity: Granularity) -> Vec<TimelineBucket> {
    let mut buckets: BTreeMap<TimeBucketKey, u64> = BTreeMap::new();
    for s in signals.iter() {
        *buckets
            .entry(TimeBucketKey::of(&s.timestamp, granularity))
            .or_insert(0) += 1;
    }
    debug!(
        "build_timeline: {} signals in {} buckets ({})",
        signals.len(),
        buckets.len(),
        granularity.name()
    );
    buckets
        .into_iter()
        .map(|(key, count)| TimelineBucket { key, count })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn signal(category: Category, ts: DateTime<Utc>) -> VoteSignal {
        VoteSignal {
            category,
            score: category.score() as f64,
            timestamp: ts,
            origin: SignalOrigin::Standalone,
        }
    }

    #[test]
    fn summary_example() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let signals: Vec<VoteSignal> = [
            Category::Like,
            Category::Like,
            Category::Neutral,
            Category::SuperDislike,
        ]
        .iter()
        .map(|c| signal(*c, ts))
        .collect();
        let summary = summarize(&signals);
        assert_eq!(summary.total_count, 4);
        assert_eq!(summary.average_score, Some(3.0));
        assert_eq!(summary.average_label, "Neutral");
        let counts: Vec<u64> = summary.counts.iter().map(|cc| cc.count).collect();
        assert_eq!(counts, vec![0, 2, 1, 0, 1]);
        assert_eq!(summary.count_of(Category::SuperDislike), 1);
        assert_eq!(summary.counts[1].percentage, 50.0);
        assert_eq!(summary.counts[0].percentage, 0.0);
    }

    #[test]
    fn summary_of_nothing() {
        let summary = summarize(&[]);
        assert_eq!(summary.total_count, 0);
        assert_eq!(summary.average_score, None);
        assert_eq!(summary.average_label, "N/A");
        assert_eq!(summary.counts.len(), 5);
        assert!(summary.counts.iter().all(|cc| cc.count == 0));
    }

    #[test]
    fn summary_keeps_fractional_scores() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let mut s = signal(Category::SuperLike, ts);
        s.score = 4.5;
        let summary = summarize(&[s, signal(Category::Like, ts)]);
        assert_eq!(summary.average_score, Some(4.25));
        assert_eq!(summary.average_label, "Satisfied");
    }

    #[test]
    fn hourly_timeline() {
        let signals = vec![
            signal(Category::Like, Utc.with_ymd_and_hms(2024, 1, 1, 14, 0, 0).unwrap()),
            signal(Category::Like, Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()),
            signal(Category::Dislike, Utc.with_ymd_and_hms(2024, 1, 1, 9, 30, 0).unwrap()),
        ];
        let timeline = build_timeline(&signals, Granularity::Hour);
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline[0].key.hour, Some(9));
        assert_eq!(timeline[0].count, 2);
        assert_eq!(timeline[1].key.hour, Some(14));
        assert_eq!(timeline[1].count, 1);
        assert_eq!(timeline[0].key.label(), "2024-01-01 09:00");
    }

    #[test]
    fn hourly_timeline_spans_days_without_complaint() {
        let signals = vec![
            signal(Category::Like, Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap()),
            signal(Category::Like, Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()),
        ];
        let timeline = build_timeline(&signals, Granularity::Hour);
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline[0].key.day, Some(1));
        assert_eq!(timeline[1].key.day, Some(2));
    }

    #[test]
    fn daily_and_monthly_timelines() {
        let signals = vec![
            signal(Category::Like, Utc.with_ymd_and_hms(2024, 2, 3, 9, 0, 0).unwrap()),
            signal(Category::Like, Utc.with_ymd_and_hms(2023, 12, 31, 23, 0, 0).unwrap()),
            signal(Category::Like, Utc.with_ymd_and_hms(2024, 2, 1, 9, 0, 0).unwrap()),
            signal(Category::Like, Utc.with_ymd_and_hms(2024, 2, 1, 18, 0, 0).unwrap()),
        ];
        let daily = build_timeline(&signals, Granularity::Day);
        let labels: Vec<(String, u64)> = daily.iter().map(|b| (b.key.label(), b.count)).collect();
        assert_eq!(
            labels,
            vec![
                ("2023-12-31".to_string(), 1),
                ("2024-02-01".to_string(), 2),
                ("2024-02-03".to_string(), 1),
            ]
        );
        let monthly = build_timeline(&signals, Granularity::Month);
        let labels: Vec<(String, u64)> =
            monthly.iter().map(|b| (b.key.label(), b.count)).collect();
        assert_eq!(
            labels,
            vec![("2023-12".to_string(), 1), ("2024-02".to_string(), 3)]
        );
    }

    #[test]
    fn missing_fields_compare_as_zero() {
        let month = TimeBucketKey {
            year: 2024,
            month: 1,
            day: None,
            hour: None,
        };
        let day = TimeBucketKey {
            year: 2024,
            month: 1,
            day: Some(1),
            hour: None,
        };
        let zero = TimeBucketKey {
            year: 2024,
            month: 1,
            day: Some(0),
            hour: Some(0),
        };
        assert!(month < day);
        assert_eq!(month, zero);
    }
}
