//! Parse conversation exports into validated records.
//!
//! Two input shapes are supported: a flat CSV table with a configurable
//! column mapping, and the JSON session export written by the inference
//! pipeline (`{"sessions": [...]}`).

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::ColumnMapping;
use crate::error::{AnalyticsError, Result};
use crate::models::{ConversationRecord, Source};

const UNKNOWN_LABEL: &str = "unknown";

/// Sentiment scores inside this band around zero count as neutral.
const NEUTRAL_BAND: f64 = 0.05;

/// Load every path into one snapshot, choosing the parser by extension.
pub fn load_paths<P: AsRef<Path>>(
    paths: &[P],
    columns: &ColumnMapping,
) -> Result<Vec<ConversationRecord>> {
    let mut records = Vec::new();
    for path in paths {
        records.extend(load_path(path.as_ref(), columns)?);
    }
    Ok(records)
}

pub fn load_path(path: &Path, columns: &ColumnMapping) -> Result<Vec<ConversationRecord>> {
    let data_source = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let file = File::open(path)?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let (records, skipped) = if is_json {
        parse_sessions(file, &data_source, columns)?
    } else {
        (read_csv(file, &data_source, columns)?, 0)
    };

    info!(
        path = %path.display(),
        records = records.len(),
        skipped,
        "loaded conversation records"
    );
    Ok(records)
}

/// Index of each mapped column in the CSV header.
struct HeaderIndex {
    timestamp: usize,
    source: usize,
    intent: Option<usize>,
    sentiment: Option<usize>,
    urgency: Option<usize>,
    escalated: Option<usize>,
    session_id: Option<usize>,
    escalation_level: Option<usize>,
    complexity: Option<usize>,
    resolution: Option<usize>,
    risk_flags: Option<usize>,
    intent_flow: Option<usize>,
}

impl HeaderIndex {
    fn resolve(headers: &StringRecord, columns: &ColumnMapping) -> Result<Self> {
        let mut positions: HashMap<&str, usize> = HashMap::new();
        for (index, name) in headers.iter().enumerate() {
            if positions.insert(name, index).is_some() && columns.is_mapped(name) {
                return Err(AnalyticsError::malformed(
                    1,
                    name,
                    "column appears more than once in header",
                ));
            }
        }
        let find = |name: &str| positions.get(name).copied();
        let require = |name: &str| {
            find(name).ok_or_else(|| AnalyticsError::malformed(1, name, "column missing from header"))
        };

        Ok(Self {
            timestamp: require(&columns.timestamp)?,
            source: require(&columns.source)?,
            intent: find(&columns.intent),
            sentiment: find(&columns.sentiment),
            urgency: find(&columns.urgency),
            escalated: find(&columns.escalated),
            session_id: find(&columns.session_id),
            escalation_level: find(&columns.escalation_level),
            complexity: find(&columns.complexity),
            resolution: find(&columns.resolution),
            risk_flags: find(&columns.risk_flags),
            intent_flow: find(&columns.intent_flow),
        })
    }
}

/// Parse a CSV table. Columns not named in `columns` are ignored.
pub fn read_csv<R: Read>(
    reader: R,
    data_source: &str,
    columns: &ColumnMapping,
) -> Result<Vec<ConversationRecord>> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(reader);
    let index = HeaderIndex::resolve(reader.headers()?, columns)?;

    let mut records = Vec::new();
    for result in reader.records() {
        let row = result?;
        let line = row.position().map(|pos| pos.line()).unwrap_or(0);
        let cell = |position: Option<usize>| {
            position
                .and_then(|i| row.get(i))
                .filter(|value| !value.is_empty())
        };

        let raw_timestamp = cell(Some(index.timestamp))
            .ok_or_else(|| AnalyticsError::malformed(line, &columns.timestamp, "missing value"))?;
        let timestamp = parse_timestamp(raw_timestamp).ok_or_else(|| {
            AnalyticsError::malformed(
                line,
                &columns.timestamp,
                format!("unparsable timestamp '{raw_timestamp}'"),
            )
        })?;

        let raw_source = cell(Some(index.source))
            .ok_or_else(|| AnalyticsError::malformed(line, &columns.source, "missing value"))?;
        let source = parse_source(raw_source, line)?;

        let escalated = match cell(index.escalated) {
            Some(value) => parse_bool(value).ok_or_else(|| {
                AnalyticsError::malformed(
                    line,
                    &columns.escalated,
                    format!("expected a boolean, got '{value}'"),
                )
            })?,
            None => false,
        };

        let sentiment = match cell(index.sentiment) {
            Some(value) => sentiment_label(value),
            None => UNKNOWN_LABEL.to_string(),
        };

        let intents = split_labels(cell(index.intent).unwrap_or_default(), &columns.delimiter);

        records.push(ConversationRecord {
            session_id: cell(index.session_id)
                .map(str::to_string)
                .unwrap_or_else(|| format!("row-{line}")),
            timestamp,
            source,
            intent_count: intents.len(),
            intents,
            sentiment,
            urgency: cell(index.urgency)
                .map(|value| value.to_lowercase())
                .unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
            escalated,
            escalation_level: cell(index.escalation_level).map(str::to_string),
            complexity_score: parse_score(cell(index.complexity), line, &columns.complexity)?,
            resolution_confidence: parse_score(cell(index.resolution), line, &columns.resolution)?,
            risk_flags: split_labels(cell(index.risk_flags).unwrap_or_default(), &columns.delimiter),
            intent_flow: cell(index.intent_flow).map(str::to_string),
            data_source: data_source.to_string(),
        });
    }

    Ok(records)
}

#[derive(Debug, Deserialize)]
struct SessionExport {
    #[serde(default)]
    sessions: Vec<Session>,
}

#[derive(Debug, Deserialize)]
struct Session {
    #[serde(rename = "sessionId", default)]
    session_id: Option<String>,
    #[serde(default)]
    messages: Vec<Message>,
    session_inference: Option<SessionInference>,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionInference {
    source: Option<String>,
    #[serde(default)]
    primary_intent: Option<String>,
    #[serde(default)]
    topics: Vec<serde_json::Value>,
    #[serde(default)]
    sentiment: Option<serde_json::Value>,
    #[serde(default)]
    urgency: Option<String>,
    #[serde(default)]
    escalation: Option<Escalation>,
    #[serde(default)]
    complexity_score: Option<f64>,
    #[serde(default)]
    resolution_confidence: Option<f64>,
    #[serde(default)]
    risk_flags: Vec<String>,
    #[serde(default)]
    intent_flow: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Escalation {
    #[serde(default)]
    required: bool,
    #[serde(default)]
    level: Option<String>,
}

/// Parse a JSON session export.
///
/// The session time is its earliest parsable message timestamp; sessions
/// with none are skipped.
pub fn read_sessions_json<R: Read>(
    reader: R,
    data_source: &str,
    columns: &ColumnMapping,
) -> Result<Vec<ConversationRecord>> {
    parse_sessions(reader, data_source, columns).map(|(records, _)| records)
}

/// Records plus the number of sessions skipped for lack of a timestamp.
fn parse_sessions<R: Read>(
    reader: R,
    data_source: &str,
    columns: &ColumnMapping,
) -> Result<(Vec<ConversationRecord>, usize)> {
    let export: SessionExport = serde_json::from_reader(reader)?;
    let mut records = Vec::with_capacity(export.sessions.len());
    let mut skipped = 0usize;

    for (position, session) in export.sessions.into_iter().enumerate() {
        let row = position as u64 + 1;
        let session_id = session
            .session_id
            .unwrap_or_else(|| format!("session-{row}"));

        let Some(timestamp) = session
            .messages
            .iter()
            .filter_map(|message| message.timestamp.as_deref())
            .filter_map(parse_timestamp)
            .min()
        else {
            warn!(%session_id, data_source, "skipping session without message timestamps");
            skipped += 1;
            continue;
        };

        let inference = session.session_inference.ok_or_else(|| {
            AnalyticsError::malformed(row, "session_inference", "missing value")
        })?;
        let raw_source = inference
            .source
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| AnalyticsError::malformed(row, &columns.source, "missing value"))?;
        let source = parse_source(raw_source, row)?;

        let mut intents = Vec::new();
        if let Some(primary) = inference.primary_intent.as_deref() {
            push_distinct(&mut intents, primary);
        }
        for topic in &inference.topics {
            if let Some(label) = topic_label(topic) {
                push_distinct(&mut intents, label);
            }
        }

        let mut risk_flags = Vec::new();
        for flag in &inference.risk_flags {
            push_distinct(&mut risk_flags, flag);
        }

        let sentiment = match &inference.sentiment {
            Some(serde_json::Value::String(label)) if !label.trim().is_empty() => {
                sentiment_label(label)
            }
            Some(serde_json::Value::Number(score)) => score
                .as_f64()
                .map(score_label)
                .unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
            _ => UNKNOWN_LABEL.to_string(),
        };

        let (escalated, escalation_level) = match inference.escalation {
            Some(escalation) => (escalation.required, escalation.level),
            None => (false, None),
        };

        records.push(ConversationRecord {
            session_id,
            timestamp,
            source,
            intents,
            intent_count: inference.topics.len(),
            sentiment,
            urgency: inference
                .urgency
                .map(|value| value.trim().to_lowercase())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
            escalated,
            escalation_level: escalation_level.filter(|level| !level.trim().is_empty()),
            complexity_score: inference.complexity_score,
            resolution_confidence: inference.resolution_confidence,
            risk_flags,
            intent_flow: inference.intent_flow.as_ref().and_then(flow_label),
            data_source: data_source.to_string(),
        });
    }

    Ok((records, skipped))
}

/// Intent flow is either a preformatted string or a list of steps.
fn flow_label(flow: &serde_json::Value) -> Option<String> {
    let label = match flow {
        serde_json::Value::String(label) => label.trim().to_string(),
        serde_json::Value::Array(steps) => steps
            .iter()
            .filter_map(|step| step.as_str())
            .collect::<Vec<_>>()
            .join(" -> "),
        _ => return None,
    };
    (!label.is_empty()).then_some(label)
}

fn topic_label(topic: &serde_json::Value) -> Option<&str> {
    match topic {
        serde_json::Value::String(label) => Some(label.as_str()),
        serde_json::Value::Object(fields) => ["intent", "name", "topic"]
            .iter()
            .find_map(|key| fields.get(*key).and_then(|value| value.as_str())),
        _ => None,
    }
}

fn push_distinct(labels: &mut Vec<String>, label: &str) {
    let label = label.trim();
    if !label.is_empty() && !labels.iter().any(|existing| existing == label) {
        labels.push(label.to_string());
    }
}

/// Split a multi-valued cell into distinct, trimmed, non-empty labels.
pub fn split_labels(value: &str, delimiter: &str) -> Vec<String> {
    let mut labels = Vec::new();
    for part in value.split(delimiter) {
        push_distinct(&mut labels, part);
    }
    labels
}

fn parse_source(value: &str, row: u64) -> Result<Source> {
    value
        .parse::<Source>()
        .map_err(|error| AnalyticsError::UnknownSource { row, value: error.0 })
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS` and plain dates.
///
/// Naive values are taken as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Some(parsed.and_utc());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|datetime| datetime.and_utc())
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Some(true),
        "false" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

fn parse_score(value: Option<&str>, row: u64, column: &str) -> Result<Option<f64>> {
    value
        .map(|raw| {
            raw.parse::<f64>()
                .ok()
                .filter(|score| score.is_finite())
                .ok_or_else(|| {
                    AnalyticsError::malformed(row, column, format!("expected a number, got '{raw}'"))
                })
        })
        .transpose()
}

/// Categorical labels are lowercased; numeric scores map onto a label.
fn sentiment_label(value: &str) -> String {
    match value.trim().parse::<f64>() {
        Ok(score) if score.is_finite() => score_label(score),
        _ => value.trim().to_lowercase(),
    }
}

fn score_label(score: f64) -> String {
    let label = if score < -NEUTRAL_BAND {
        "negative"
    } else if score > NEUTRAL_BAND {
        "positive"
    } else {
        "neutral"
    };
    label.to_string()
}
