use crate::report::*;

use serde::{Deserialize, Serialize};

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(rename = "reportName")]
    pub report_name: String,
    #[serde(rename = "outputDirectory")]
    pub output_directory: Option<String>,
}

/// The `config` section of a report.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(rename = "reportName")]
    pub report_name: String,
    pub account: String,
    #[serde(rename = "startDate")]
    pub start_date: Option<String>,
    #[serde(rename = "endDate")]
    pub end_date: Option<String>,
    pub granularity: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuerySettings {
    pub account: Option<String>,
    #[serde(rename = "startDate")]
    pub start_date: Option<String>,
    #[serde(rename = "endDate")]
    pub end_date: Option<String>,
    pub granularity: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct FileSource {
    pub provider: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(rename = "recordKind")]
    pub record_kind: Option<String>,
    #[serde(rename = "excelWorksheetName")]
    pub excel_worksheet_name: Option<String>,
}

impl FileSource {
    pub fn record_kind(&self) -> ReportResult<RecordKind> {
        RecordKind::parse(self.record_kind.as_deref())
    }
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct RulesSettings {
    #[serde(rename = "visitWindowMinutes")]
    pub visit_window_minutes: Option<f64>,
    #[serde(rename = "scoreTolerance")]
    pub score_tolerance: Option<f64>,
}

// A visit never lasts longer than a day.
const MAX_VISIT_WINDOW_MINUTES: f64 = 24.0 * 60.0;

impl RulesSettings {
    pub fn to_rules(&self) -> ReportResult<ReconcileRules> {
        let defaults = ReconcileRules::DEFAULT_RULES;
        let visit_window_secs = match self.visit_window_minutes {
            None => defaults.visit_window_secs,
            Some(m) if m.is_finite() && (0.0..=MAX_VISIT_WINDOW_MINUTES).contains(&m) => {
                (m * 60.0).round() as i64
            }
            Some(m) => whatever!(
                "visitWindowMinutes must be between 0 and {}, got {}",
                MAX_VISIT_WINDOW_MINUTES,
                m
            ),
        };
        let score_tolerance = match self.score_tolerance {
            None => defaults.score_tolerance,
            Some(t) if t.is_finite() && t >= 0.0 => t,
            Some(t) => whatever!("scoreTolerance must be a positive number, got {}", t),
        };
        Ok(ReconcileRules {
            visit_window_secs,
            score_tolerance,
        })
    }
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(rename = "outputSettings")]
    pub output_settings: OutputSettings,
    #[serde(default)]
    pub query: QuerySettings,
    #[serde(rename = "recordSources", default)]
    pub record_sources: Vec<FileSource>,
    pub rules: Option<RulesSettings>,
}

pub fn read_config(path: &str) -> ReportResult<ReportConfig> {
    let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })
}

/// Reads a reference report.
pub fn read_summary(path: &str) -> ReportResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })
}
