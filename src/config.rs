//! Layered dashboard configuration.
//!
//! Sources, highest priority last:
//! 1. Built-in defaults
//! 2. A TOML file (`--config`, or `chat-analytics.toml` in the working directory)
//! 3. Environment variables prefixed `CHAT_ANALYTICS_` (e.g. `CHAT_ANALYTICS_BASELINE_WINDOW=14`)
//!
//! All keys are flat; there are no nested sections.

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::models::Granularity;
use crate::spike::SpikeConfig;

pub const DEFAULT_CONFIG_FILE: &str = "chat-analytics.toml";
pub const ENV_PREFIX: &str = "CHAT_ANALYTICS_";

const fn default_baseline_window() -> usize {
    7
}

const fn default_threshold_multiplier() -> f64 {
    2.0
}

const fn default_alert_threshold() -> f64 {
    0.30
}

fn default_intent_delimiter() -> String {
    ";".to_string()
}

fn column(name: &str) -> String {
    name.to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DashboardConfig {
    /// Number of preceding buckets averaged into the spike baseline.
    #[serde(default = "default_baseline_window")]
    pub baseline_window: usize,

    /// Factor over the baseline an escalation rate must exceed to trigger.
    #[serde(default = "default_threshold_multiplier")]
    pub threshold_multiplier: f64,

    #[serde(default)]
    pub granularity: Granularity,

    /// Absolute escalation rate (0..=1) reported as a threshold breach.
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: f64,

    /// Separator for multi-valued cells (intents, risk flags).
    #[serde(default = "default_intent_delimiter")]
    pub intent_delimiter: String,

    #[serde(default = "default_timestamp_column")]
    pub timestamp_column: String,
    #[serde(default = "default_source_column")]
    pub source_column: String,
    #[serde(default = "default_intent_column")]
    pub intent_column: String,
    #[serde(default = "default_sentiment_column")]
    pub sentiment_column: String,
    #[serde(default = "default_urgency_column")]
    pub urgency_column: String,
    #[serde(default = "default_escalated_column")]
    pub escalated_column: String,
    #[serde(default = "default_session_id_column")]
    pub session_id_column: String,
    #[serde(default = "default_escalation_level_column")]
    pub escalation_level_column: String,
    #[serde(default = "default_complexity_column")]
    pub complexity_column: String,
    #[serde(default = "default_resolution_column")]
    pub resolution_column: String,
    #[serde(default = "default_risk_flags_column")]
    pub risk_flags_column: String,
    #[serde(default = "default_intent_flow_column")]
    pub intent_flow_column: String,
}

fn default_timestamp_column() -> String {
    column("timestamp")
}
fn default_source_column() -> String {
    column("source")
}
fn default_intent_column() -> String {
    column("intent")
}
fn default_sentiment_column() -> String {
    column("sentiment")
}
fn default_urgency_column() -> String {
    column("urgency")
}
fn default_escalated_column() -> String {
    column("escalated")
}
fn default_session_id_column() -> String {
    column("session_id")
}
fn default_escalation_level_column() -> String {
    column("escalation_level")
}
fn default_complexity_column() -> String {
    column("complexity_score")
}
fn default_resolution_column() -> String {
    column("resolution_confidence")
}
fn default_risk_flags_column() -> String {
    column("risk_flags")
}
fn default_intent_flow_column() -> String {
    column("intent_flow")
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            baseline_window: default_baseline_window(),
            threshold_multiplier: default_threshold_multiplier(),
            granularity: Granularity::default(),
            alert_threshold: default_alert_threshold(),
            intent_delimiter: default_intent_delimiter(),
            timestamp_column: default_timestamp_column(),
            source_column: default_source_column(),
            intent_column: default_intent_column(),
            sentiment_column: default_sentiment_column(),
            urgency_column: default_urgency_column(),
            escalated_column: default_escalated_column(),
            session_id_column: default_session_id_column(),
            escalation_level_column: default_escalation_level_column(),
            complexity_column: default_complexity_column(),
            resolution_column: default_resolution_column(),
            risk_flags_column: default_risk_flags_column(),
            intent_flow_column: default_intent_flow_column(),
        }
    }
}

/// Column names the CSV loader looks up in the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub timestamp: String,
    pub source: String,
    pub intent: String,
    pub sentiment: String,
    pub urgency: String,
    pub escalated: String,
    pub session_id: String,
    pub escalation_level: String,
    pub complexity: String,
    pub resolution: String,
    pub risk_flags: String,
    pub intent_flow: String,
    pub delimiter: String,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        DashboardConfig::default().columns()
    }
}

impl ColumnMapping {
    /// Whether a header name is one the loader reads.
    pub fn is_mapped(&self, name: &str) -> bool {
        [
            &self.timestamp,
            &self.source,
            &self.intent,
            &self.sentiment,
            &self.urgency,
            &self.escalated,
            &self.session_id,
            &self.escalation_level,
            &self.complexity,
            &self.resolution,
            &self.risk_flags,
            &self.intent_flow,
        ]
        .iter()
        .any(|column| column.as_str() == name)
    }
}

impl DashboardConfig {
    /// Load from defaults, the given TOML file (or the default file if present) and env vars.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config: Self = Self::figment(path).extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        match path {
            Some(path) => figment = figment.merge(Toml::file_exact(path)),
            None => {
                let local = PathBuf::from(DEFAULT_CONFIG_FILE);
                if local.exists() {
                    figment = figment.merge(Toml::file(local));
                }
            }
        }

        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.spike_config()?;

        if !(0.0..=1.0).contains(&self.alert_threshold) {
            return Err(invalid(
                "alert_threshold",
                format!("must be between 0 and 1, got {}", self.alert_threshold),
            ));
        }

        if self.intent_delimiter.is_empty() {
            return Err(invalid("intent_delimiter", "must not be empty"));
        }

        let columns = [
            ("timestamp_column", &self.timestamp_column),
            ("source_column", &self.source_column),
        ];
        for (field, value) in columns {
            if value.trim().is_empty() {
                return Err(invalid(field, "required column name must not be empty"));
            }
        }

        Ok(())
    }

    pub fn spike_config(&self) -> Result<SpikeConfig, ConfigError> {
        SpikeConfig::new(self.baseline_window, self.threshold_multiplier)
    }

    pub fn columns(&self) -> ColumnMapping {
        ColumnMapping {
            timestamp: self.timestamp_column.clone(),
            source: self.source_column.clone(),
            intent: self.intent_column.clone(),
            sentiment: self.sentiment_column.clone(),
            urgency: self.urgency_column.clone(),
            escalated: self.escalated_column.clone(),
            session_id: self.session_id_column.clone(),
            escalation_level: self.escalation_level_column.clone(),
            complexity: self.complexity_column.clone(),
            resolution: self.resolution_column.clone(),
            risk_flags: self.risk_flags_column.clone(),
            intent_flow: self.intent_flow_column.clone(),
            delimiter: self.intent_delimiter.clone(),
        }
    }
}

pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.into(),
    }
}
