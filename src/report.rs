use std::fmt::{self, Write as _};
use std::io;

use chrono::{NaiveDate, SecondsFormat};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

use crate::error::{AnalyticsError, Result};
use crate::models::{
    AggregateBucket, ConversationRecord, Granularity, Grouping, Overview, SourceTimeBucket, SpikeAlert,
    ThresholdBreach, TimeBucket,
};
use crate::session::Dashboard;

/// A single cell handed to the renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => Ok(()),
            Scalar::Bool(value) => write!(f, "{value}"),
            Scalar::Integer(value) => write!(f, "{value}"),
            Scalar::Float(value) => write!(f, "{value:.4}"),
            Scalar::Text(value) => f.write_str(value),
            Scalar::Date(value) => write!(f, "{value}"),
        }
    }
}

impl Scalar {
    /// Cell text without display rounding, for machine-readable output.
    pub fn to_exact_string(&self) -> String {
        match self {
            Scalar::Float(value) => value.to_string(),
            other => other.to_string(),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<usize> for Scalar {
    fn from(value: usize) -> Self {
        Scalar::Integer(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<NaiveDate> for Scalar {
    fn from(value: NaiveDate) -> Self {
        Scalar::Date(value)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(value: Option<T>) -> Self {
        value.map_or(Scalar::Null, Into::into)
    }
}

/// Rectangular rows keyed by column name, in column order.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Scalar>>,
}

impl Table {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Build a table, rejecting any row whose width differs from the header.
    pub fn from_rows<S: Into<String>>(
        columns: impl IntoIterator<Item = S>,
        rows: Vec<Vec<Scalar>>,
    ) -> Result<Self> {
        let mut table = Self::new(columns);
        table.rows.reserve(rows.len());
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    pub fn push_row(&mut self, row: Vec<Scalar>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(AnalyticsError::ShapeMismatch {
                row: self.rows.len() + 1,
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Scalar>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Scalar> {
        let index = self.columns.iter().position(|name| name == column)?;
        self.rows.get(row).and_then(|values| values.get(index))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_csv<W: io::Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(Scalar::to_exact_string))?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Plain aligned columns for terminal output.
    pub fn to_text(&self) -> String {
        let cells: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| row.iter().map(Scalar::to_string).collect())
            .collect();
        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, name)| {
                cells
                    .iter()
                    .map(|row| row[i].chars().count())
                    .chain(std::iter::once(name.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let mut output = String::new();
        push_aligned(&mut output, self.columns.iter().map(String::as_str), &widths);
        for row in &cells {
            push_aligned(&mut output, row.iter().map(String::as_str), &widths);
        }
        output
    }

    pub fn to_markdown(&self) -> String {
        let mut output = String::new();
        let header: Vec<String> = self.columns.iter().map(|name| markdown_cell(name)).collect();
        let _ = writeln!(output, "| {} |", header.join(" | "));
        let _ = writeln!(
            output,
            "|{}",
            self.columns.iter().map(|_| " --- |").collect::<String>()
        );
        for row in &self.rows {
            let values: Vec<String> = row
                .iter()
                .map(|value| markdown_cell(&value.to_string()))
                .collect();
            let _ = writeln!(output, "| {} |", values.join(" | "));
        }
        output
    }
}

impl Serialize for Table {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        struct RowRef<'a>(&'a [String], &'a [Scalar]);

        impl Serialize for RowRef<'_> {
            fn serialize<S: Serializer>(
                &self,
                serializer: S,
            ) -> std::result::Result<S::Ok, S::Error> {
                let mut map = serializer.serialize_map(Some(self.0.len()))?;
                for (column, value) in self.0.iter().zip(self.1) {
                    map.serialize_entry(column, value)?;
                }
                map.end()
            }
        }

        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for row in &self.rows {
            seq.serialize_element(&RowRef(&self.columns, row))?;
        }
        seq.end()
    }
}

fn push_aligned<'a>(output: &mut String, values: impl Iterator<Item = &'a str>, widths: &[usize]) {
    let padded: Vec<String> = values
        .zip(widths)
        .map(|(value, &width)| format!("{value:<width$}"))
        .collect();
    let _ = writeln!(output, "{}", padded.join("  ").trim_end());
}

/// Keeps a cell on one line and inside its column.
fn markdown_cell(value: &str) -> String {
    value
        .replace('|', "\\|")
        .replace("\r\n", "<br>")
        .replace(['\r', '\n'], "<br>")
}

fn period_column(granularity: Granularity) -> &'static str {
    match granularity {
        Granularity::Day => "date",
        Granularity::Week => "week_start",
    }
}

pub fn bucket_table(buckets: &[AggregateBucket], grouping: Grouping) -> Result<Table> {
    let rows: Vec<Vec<Scalar>> = buckets
        .iter()
        .map(|bucket| {
            vec![
                bucket.key.clone().into(),
                bucket.count.into(),
                bucket.rate.into(),
                bucket.escalated.into(),
                bucket.escalation_rate.into(),
            ]
        })
        .collect();

    Table::from_rows(
        [grouping.key_column(), "count", "rate", "escalated", "escalation_rate"],
        rows,
    )
}

pub fn series_table(series: &[TimeBucket], granularity: Granularity) -> Result<Table> {
    let rows: Vec<Vec<Scalar>> = series
        .iter()
        .map(|bucket| {
            vec![
                bucket.period.into(),
                bucket.sessions.into(),
                bucket.escalated.into(),
                bucket.escalation_rate.into(),
                bucket.avg_complexity.into(),
                bucket.avg_resolution.into(),
            ]
        })
        .collect();

    Table::from_rows(
        [
            period_column(granularity),
            "sessions",
            "escalated",
            "escalation_rate",
            "avg_complexity",
            "avg_resolution",
        ],
        rows,
    )
}

pub fn source_series_table(
    series: &[SourceTimeBucket],
    granularity: Granularity,
) -> Result<Table> {
    let rows: Vec<Vec<Scalar>> = series
        .iter()
        .map(|bucket| {
            vec![
                bucket.period.into(),
                bucket.source.label().into(),
                bucket.sessions.into(),
            ]
        })
        .collect();

    Table::from_rows([period_column(granularity), "source", "sessions"], rows)
}

pub fn alert_table(alerts: &[SpikeAlert], granularity: Granularity) -> Result<Table> {
    let rows: Vec<Vec<Scalar>> = alerts
        .iter()
        .map(|alert| {
            vec![
                alert.period.into(),
                alert.observed_rate.into(),
                alert.baseline_rate.into(),
                alert.triggered.into(),
            ]
        })
        .collect();

    Table::from_rows(
        [
            period_column(granularity),
            "observed_rate",
            "baseline_rate",
            "triggered",
        ],
        rows,
    )
}

pub fn breach_table(breaches: &[ThresholdBreach], granularity: Granularity) -> Result<Table> {
    let rows: Vec<Vec<Scalar>> = breaches
        .iter()
        .map(|breach| {
            vec![
                breach.period.into(),
                breach.sessions.into(),
                (breach.escalation_rate * 100.0).into(),
            ]
        })
        .collect();

    Table::from_rows(
        [period_column(granularity), "sessions", "escalation_pct"],
        rows,
    )
}

/// One row per session, for drilling into the records behind the buckets.
pub fn records_table(records: &[ConversationRecord]) -> Result<Table> {
    let rows: Vec<Vec<Scalar>> = records
        .iter()
        .map(|record| {
            vec![
                record.session_id.clone().into(),
                record
                    .timestamp
                    .to_rfc3339_opts(SecondsFormat::Secs, true)
                    .into(),
                record.source.label().into(),
                record.primary_intent().into(),
                record.intents.join("; ").into(),
                record.intent_count.into(),
                record.sentiment.clone().into(),
                record.urgency.clone().into(),
                record.escalated.into(),
                record.escalation_level.clone().into(),
                record.complexity_score.into(),
                record.resolution_confidence.into(),
                record.risk_flags.join("; ").into(),
                record.intent_flow.clone().into(),
                record.data_source.clone().into(),
            ]
        })
        .collect();

    Table::from_rows(
        [
            "session_id",
            "timestamp",
            "source",
            "primary_intent",
            "intents",
            "intent_count",
            "sentiment",
            "urgency",
            "escalated",
            "escalation_level",
            "complexity_score",
            "resolution_confidence",
            "risk_flags",
            "intent_flow",
            "data_source",
        ],
        rows,
    )
}

pub fn overview_table(overview: &Overview) -> Result<Table> {
    Table::from_rows(
        ["metric", "value"],
        vec![
            vec!["total_sessions".into(), overview.total_sessions.into()],
            vec!["it_support_sessions".into(), overview.it_support_sessions.into()],
            vec!["helpdesk_sessions".into(), overview.helpdesk_sessions.into()],
            vec!["escalation_rate".into(), overview.escalation_rate.into()],
        ],
    )
}

/// Markdown report covering every dashboard section.
pub fn build_report(dashboard: &Dashboard) -> Result<String> {
    let mut output = String::new();
    let granularity = dashboard.granularity;

    let _ = writeln!(output, "# Chat Inference Analytics Report");
    let _ = writeln!(
        output,
        "Run {} over {} sessions ({} buckets)",
        dashboard.run_id, dashboard.overview.total_sessions, granularity
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Session Overview");
    let _ = writeln!(
        output,
        "- Total sessions: {}",
        dashboard.overview.total_sessions
    );
    let _ = writeln!(
        output,
        "- IT Support sessions: {}",
        dashboard.overview.it_support_sessions
    );
    let _ = writeln!(
        output,
        "- Helpdesk sessions: {}",
        dashboard.overview.helpdesk_sessions
    );
    let _ = writeln!(
        output,
        "- Escalation rate: {:.1}%",
        dashboard.overview.escalation_rate * 100.0
    );

    let sections = [
        ("Sources", Grouping::Source, &dashboard.sources),
        ("Intents", Grouping::Intent, &dashboard.intents),
        ("Primary Intents", Grouping::PrimaryIntent, &dashboard.primary_intents),
        ("Single vs Multi-Intent Sessions", Grouping::IntentCount, &dashboard.intent_counts),
        ("Sentiment", Grouping::Sentiment, &dashboard.sentiment),
        ("Urgency", Grouping::Urgency, &dashboard.urgency),
        ("Risk Flags", Grouping::RiskFlag, &dashboard.risk_flags),
        ("Escalation Levels", Grouping::EscalationLevel, &dashboard.escalation_levels),
    ];

    for (title, grouping, buckets) in sections {
        let _ = writeln!(output);
        let _ = writeln!(output, "## {title}");
        if buckets.is_empty() {
            let _ = writeln!(output, "No sessions recorded for this dimension.");
        } else {
            output.push_str(&bucket_table(buckets, grouping)?.to_markdown());
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Escalation Trend");
    if dashboard.series.is_empty() {
        let _ = writeln!(output, "No sessions recorded for this window.");
    } else {
        output.push_str(&series_table(&dashboard.series, granularity)?.to_markdown());
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Sessions by Source");
    if dashboard.source_series.is_empty() {
        let _ = writeln!(output, "No sessions recorded for this window.");
    } else {
        output.push_str(&source_series_table(&dashboard.source_series, granularity)?.to_markdown());
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Escalation Spike Alerts");
    let triggered: Vec<SpikeAlert> = dashboard
        .alerts
        .iter()
        .filter(|alert| alert.triggered)
        .cloned()
        .collect();
    if dashboard.alerts.is_empty() {
        let _ = writeln!(
            output,
            "Not enough history to evaluate spikes (baseline window {}).",
            dashboard.spike.baseline_window()
        );
    } else if triggered.is_empty() {
        let _ = writeln!(
            output,
            "No escalation spikes above {:.1}x the trailing {}-bucket baseline.",
            dashboard.spike.threshold_multiplier(),
            dashboard.spike.baseline_window()
        );
    } else {
        output.push_str(&alert_table(&triggered, granularity)?.to_markdown());
    }

    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "## Buckets at or above {:.0}% Escalation",
        dashboard.alert_threshold * 100.0
    );
    if dashboard.breaches.is_empty() {
        let _ = writeln!(output, "No buckets reached the escalation threshold.");
    } else {
        output.push_str(&breach_table(&dashboard.breaches, granularity)?.to_markdown());
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ragged_rows_are_rejected() {
        let err = Table::from_rows(
            ["a", "b"],
            vec![
                vec![Scalar::Integer(1), Scalar::Integer(2)],
                vec![Scalar::Integer(3)],
            ],
        )
        .unwrap_err();

        match err {
            AnalyticsError::ShapeMismatch {
                row,
                expected,
                found,
            } => {
                assert_eq!((row, expected, found), (2, 2, 1));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn bucket_rows_keep_bucket_order_and_columns() {
        let buckets = vec![
            AggregateBucket {
                key: "login".to_string(),
                count: 3,
                rate: 0.75,
                escalated: 1,
                escalation_rate: 1.0 / 3.0,
            },
            AggregateBucket {
                key: "vpn".to_string(),
                count: 1,
                rate: 0.25,
                escalated: 0,
                escalation_rate: 0.0,
            },
        ];

        let table = bucket_table(&buckets, Grouping::Intent).unwrap();
        assert_eq!(
            table.columns(),
            ["intent", "count", "rate", "escalated", "escalation_rate"]
        );
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(0, "intent"), Some(&Scalar::Text("login".to_string())));
        assert_eq!(table.get(1, "count"), Some(&Scalar::Integer(1)));
        assert_eq!(table.get(1, "missing"), None);
    }

    #[test]
    fn json_rows_are_objects_in_column_order() {
        let table = Table::from_rows(
            ["date", "sessions", "avg"],
            vec![vec![
                NaiveDate::from_ymd_opt(2026, 2, 3).unwrap().into(),
                Scalar::Integer(4),
                Scalar::Null,
            ]],
        )
        .unwrap();

        let json = serde_json::to_string(&table).unwrap();
        assert_eq!(json, r#"[{"date":"2026-02-03","sessions":4,"avg":null}]"#);
    }

    #[test]
    fn csv_output_has_header_and_rows() {
        let table = Table::from_rows(
            ["source", "sessions"],
            vec![vec!["Helpdesk".into(), 5usize.into()]],
        )
        .unwrap();
        let mut buffer = Vec::new();
        table.write_csv(&mut buffer).unwrap();
        assert_eq!(String::from_utf8(buffer).unwrap(), "source,sessions\nHelpdesk,5\n");
    }

    #[test]
    fn text_output_aligns_columns() {
        let table = Table::from_rows(
            ["metric", "value"],
            vec![vec!["total_sessions".into(), 12usize.into()]],
        )
        .unwrap();
        assert_eq!(
            table.to_text(),
            "metric          value\ntotal_sessions  12\n"
        );
    }

    #[test]
    fn markdown_output_has_separator_row() {
        let table = Table::from_rows(["a"], vec![vec![Scalar::Bool(true)]]).unwrap();
        assert_eq!(table.to_markdown(), "| a |\n| --- |\n| true |\n");
    }

    #[test]
    fn csv_keeps_full_float_precision() {
        let buckets = vec![AggregateBucket {
            key: "login".to_string(),
            count: 1,
            rate: 1.0 / 3.0,
            escalated: 0,
            escalation_rate: 0.0,
        }];
        let table = bucket_table(&buckets, Grouping::Intent).unwrap();

        let mut buffer = Vec::new();
        table.write_csv(&mut buffer).unwrap();
        assert_eq!(
            String::from_utf8(buffer).unwrap(),
            "intent,count,rate,escalated,escalation_rate\nlogin,1,0.3333333333333333,0,0\n"
        );
        assert!(table.to_text().contains("0.3333 "));
        assert!(!table.to_text().contains("0.33333"));
    }

    #[test]
    fn markdown_escapes_pipes_and_newlines() {
        let table = Table::from_rows(
            ["intent|name"],
            vec![vec!["a|b".into()], vec!["line one\nline two".into()]],
        )
        .unwrap();
        assert_eq!(
            table.to_markdown(),
            "| intent\\|name |\n| --- |\n| a\\|b |\n| line one<br>line two |\n"
        );
    }

    #[test]
    fn records_table_has_one_row_per_session() {
        use crate::models::Source;
        use chrono::{TimeZone, Utc};

        let record = ConversationRecord {
            session_id: "s-1".to_string(),
            timestamp: Utc.with_ymd_and_hms(2026, 2, 3, 9, 30, 0).unwrap(),
            source: Source::Helpdesk,
            intents: vec!["password_reset".to_string(), "account".to_string()],
            intent_count: 3,
            sentiment: "negative".to_string(),
            urgency: "high".to_string(),
            escalated: true,
            escalation_level: Some("tier2".to_string()),
            complexity_score: Some(0.8),
            resolution_confidence: None,
            risk_flags: vec!["pii".to_string()],
            intent_flow: Some("linear".to_string()),
            data_source: "sessions.json".to_string(),
        };

        let table = records_table(&[record]).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.columns().len(), 15);
        assert_eq!(
            table.get(0, "timestamp"),
            Some(&Scalar::Text("2026-02-03T09:30:00Z".to_string()))
        );
        assert_eq!(
            table.get(0, "primary_intent"),
            Some(&Scalar::Text("password_reset".to_string()))
        );
        assert_eq!(
            table.get(0, "intents"),
            Some(&Scalar::Text("password_reset; account".to_string()))
        );
        assert_eq!(table.get(0, "intent_count"), Some(&Scalar::Integer(3)));
        assert_eq!(table.get(0, "source"), Some(&Scalar::Text("Helpdesk".to_string())));
        assert_eq!(table.get(0, "complexity_score"), Some(&Scalar::Float(0.8)));
        assert_eq!(table.get(0, "resolution_confidence"), Some(&Scalar::Null));
        assert_eq!(
            table.get(0, "intent_flow"),
            Some(&Scalar::Text("linear".to_string()))
        );
    }
}
