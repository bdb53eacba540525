use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Support channel a conversation arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Source {
    #[serde(rename = "IT Support")]
    ItSupport,
    #[serde(rename = "Helpdesk")]
    Helpdesk,
}

impl Source {
    pub fn label(self) -> &'static str {
        match self {
            Source::ItSupport => "IT Support",
            Source::Helpdesk => "Helpdesk",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnrecognizedSource(pub String);

impl fmt::Display for UnrecognizedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognized source '{}'", self.0)
    }
}

impl std::error::Error for UnrecognizedSource {}

impl FromStr for Source {
    type Err = UnrecognizedSource;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized: String = value
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c == '_' || c == '-' { ' ' } else { c })
            .collect();
        let normalized = normalized.split_whitespace().collect::<Vec<_>>().join(" ");

        match normalized.as_str() {
            "it support" | "support" => Ok(Source::ItSupport),
            "helpdesk" | "help desk" | "it helpdesk" | "it help desk" => Ok(Source::Helpdesk),
            _ => Err(UnrecognizedSource(value.trim().to_string())),
        }
    }
}

/// One chatbot session as produced by the inference pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationRecord {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub source: Source,
    /// Distinct intent labels in first-seen order; the first is the primary intent.
    pub intents: Vec<String>,
    /// Number of topics the inference reported, which may differ from `intents.len()`.
    pub intent_count: usize,
    pub sentiment: String,
    pub urgency: String,
    pub escalated: bool,
    pub escalation_level: Option<String>,
    pub complexity_score: Option<f64>,
    pub resolution_confidence: Option<f64>,
    pub risk_flags: Vec<String>,
    pub intent_flow: Option<String>,
    pub data_source: String,
}

impl ConversationRecord {
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }

    pub fn primary_intent(&self) -> Option<&str> {
        self.intents.first().map(String::as_str)
    }
}

/// Time granularity for trend buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    #[default]
    Day,
    Week,
}

impl Granularity {
    /// The period a date falls into: the date itself, or the Monday starting its week.
    pub fn period_of(self, date: NaiveDate) -> NaiveDate {
        match self {
            Granularity::Day => date,
            Granularity::Week => {
                date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
            }
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Granularity::Day => f.write_str("day"),
            Granularity::Week => f.write_str("week"),
        }
    }
}

/// Dimension used to group records into buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grouping {
    Intent,
    PrimaryIntent,
    Sentiment,
    Urgency,
    Source,
    Day,
    Week,
    EscalationLevel,
    RiskFlag,
    IntentCount,
    DataSource,
}

impl Grouping {
    /// Column name used for the bucket key when the buckets are tabulated.
    pub fn key_column(self) -> &'static str {
        match self {
            Grouping::Intent => "intent",
            Grouping::PrimaryIntent => "primary_intent",
            Grouping::Sentiment => "sentiment",
            Grouping::Urgency => "urgency",
            Grouping::Source => "source",
            Grouping::Day => "day",
            Grouping::Week => "week_start",
            Grouping::EscalationLevel => "escalation_level",
            Grouping::RiskFlag => "risk_flag",
            Grouping::IntentCount => "intent_count",
            Grouping::DataSource => "data_source",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateBucket {
    pub key: String,
    pub count: usize,
    /// `count` over the number of records in scope.
    pub rate: f64,
    pub escalated: usize,
    /// `escalated` over `count`.
    pub escalation_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeBucket {
    pub period: NaiveDate,
    pub sessions: usize,
    pub escalated: usize,
    pub escalation_rate: f64,
    pub avg_complexity: Option<f64>,
    pub avg_resolution: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceTimeBucket {
    pub period: NaiveDate,
    pub source: Source,
    pub sessions: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    pub total_sessions: usize,
    pub it_support_sessions: usize,
    pub helpdesk_sessions: usize,
    pub escalation_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpikeAlert {
    pub period: NaiveDate,
    /// Position of the bucket in the evaluated series.
    pub index: usize,
    pub observed_rate: f64,
    pub baseline_rate: f64,
    pub triggered: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdBreach {
    pub period: NaiveDate,
    pub sessions: usize,
    pub escalation_rate: f64,
}
