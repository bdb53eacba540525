//! End-to-end runs over files on disk: load, aggregate, detect, format.

use std::io::Write;
use std::path::PathBuf;

use chat_analytics::models::{Grouping, Source};
use chat_analytics::report::{self, Scalar};
use chat_analytics::{AnalyticsError, DashboardConfig, RecordFilter, SessionContext};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn write_file(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).expect("create input");
    file.write_all(body.as_bytes()).expect("write input");
    path
}

fn balanced_csv() -> String {
    let mut body = String::from("session_id,timestamp,source,intent,sentiment,urgency,escalated\n");
    for i in 0..10 {
        let source = if i % 2 == 0 { "IT Support" } else { "Helpdesk" };
        body.push_str(&format!(
            "s{i},2026-02-0{} 09:00:00,{source},login;vpn,neutral,low,false\n",
            1 + i % 3
        ));
    }
    body
}

fn spike_csv() -> String {
    let mut body = String::from("timestamp,source,escalated\n");
    for day in 1..=5 {
        let escalated = if day == 5 { 9 } else { 1 };
        for i in 0..10 {
            body.push_str(&format!(
                "2026-03-0{day}T10:00:00Z,it_support,{}\n",
                i < escalated
            ));
        }
    }
    body
}

#[test]
fn balanced_sources_scenario() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "sessions.csv", &balanced_csv());

    let mut session = SessionContext::new(DashboardConfig::default()).unwrap();
    assert_eq!(session.load(&[&path]).unwrap(), 10);

    let buckets = session.buckets(&RecordFilter::default(), Grouping::Source);
    let summary: Vec<(&str, usize, f64)> = buckets
        .iter()
        .map(|b| (b.key.as_str(), b.count, b.rate))
        .collect();
    assert_eq!(summary, vec![("Helpdesk", 5, 0.5), ("IT Support", 5, 0.5)]);

    let intents = session.buckets(&RecordFilter::default(), Grouping::Intent);
    let total: usize = intents.iter().map(|b| b.count).sum();
    assert_eq!(total, 20);
    assert!(intents.iter().all(|b| b.rate == 1.0));
}

#[test]
fn spike_scenario_end_to_end() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "march.csv", &spike_csv());

    let config = DashboardConfig {
        baseline_window: 4,
        threshold_multiplier: 2.0,
        ..DashboardConfig::default()
    };
    let mut session = SessionContext::new(config).unwrap();
    session.load(&[&path]).unwrap();

    let dashboard = session.dashboard(&RecordFilter::default());
    assert_eq!(dashboard.alerts.len(), 1);
    let alert = &dashboard.alerts[0];
    assert_eq!(alert.period.to_string(), "2026-03-05");
    assert!((alert.baseline_rate - 0.1).abs() < 1e-9);
    assert!(alert.triggered);

    let table = report::alert_table(&dashboard.alerts, dashboard.granularity).unwrap();
    assert_eq!(table.get(0, "triggered"), Some(&Scalar::Bool(true)));

    let markdown = report::build_report(&dashboard).unwrap();
    assert!(markdown.contains("## Escalation Spike Alerts"));
    assert!(markdown.contains("| 2026-03-05 |"));
}

#[test]
fn missing_timestamp_aborts_the_run() {
    let dir = TempDir::new().unwrap();
    let path = write_file(
        &dir,
        "broken.csv",
        "timestamp,source,escalated\n2026-03-01,Helpdesk,false\n,Helpdesk,true\n",
    );

    let mut session = SessionContext::new(DashboardConfig::default()).unwrap();
    let err = session.load(&[&path]).unwrap_err();
    assert!(matches!(err, AnalyticsError::MalformedInput { row: 3, .. }));
    assert!(session.records().is_empty());
    assert!(session
        .buckets(&RecordFilter::default(), Grouping::Source)
        .is_empty());
}

#[test]
fn csv_and_json_inputs_combine_into_one_snapshot() {
    let dir = TempDir::new().unwrap();
    let csv = write_file(&dir, "sessions.csv", &balanced_csv());
    let json = write_file(
        &dir,
        "gold.json",
        r#"{"sessions": [{
            "sessionId": "g1",
            "messages": [{"timestamp": "2026-02-02T12:00:00Z"}],
            "session_inference": {
                "source": "it_helpdesk",
                "primary_intent": "printer",
                "topics": ["printer"],
                "sentiment": "negative",
                "urgency": "high",
                "escalation": {"required": true, "level": "L1"},
                "risk_flags": ["repeat_contact"]
            }
        }]}"#,
    );

    let mut session = SessionContext::new(DashboardConfig::default()).unwrap();
    assert_eq!(session.load(&[csv, json]).unwrap(), 11);

    let filter = RecordFilter {
        data_sources: vec!["gold.json".to_string()],
        ..RecordFilter::default()
    };
    let dashboard = session.dashboard(&filter);
    assert_eq!(dashboard.overview.total_sessions, 1);
    assert_eq!(dashboard.overview.helpdesk_sessions, 1);
    assert_eq!(dashboard.escalation_levels[0].key, "L1");
    assert_eq!(dashboard.risk_flags[0].key, "repeat_contact");

    let all = session.dashboard(&RecordFilter::default());
    assert_eq!(
        all.sources.iter().map(|b| b.count).sum::<usize>(),
        all.overview.total_sessions
    );
}

#[test]
fn source_filter_and_json_rendering() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "sessions.csv", &balanced_csv());

    let mut session = SessionContext::new(DashboardConfig::default()).unwrap();
    session.load(&[&path]).unwrap();

    let filter = RecordFilter {
        sources: vec![Source::ItSupport],
        ..RecordFilter::default()
    };
    let dashboard = session.dashboard(&filter);
    let table = report::overview_table(&dashboard.overview).unwrap();
    let json: serde_json::Value = serde_json::from_str(&table.to_json().unwrap()).unwrap();

    assert_eq!(
        json,
        serde_json::json!([
            {"metric": "total_sessions", "value": 5},
            {"metric": "it_support_sessions", "value": 5},
            {"metric": "helpdesk_sessions", "value": 0},
            {"metric": "escalation_rate", "value": 0.0}
        ])
    );
}

#[test]
fn primary_intent_drives_grouping_filter_and_session_rows() {
    let dir = TempDir::new().unwrap();
    let json = write_file(
        &dir,
        "export.json",
        r#"{"sessions": [
            {
                "sessionId": "a",
                "messages": [{"timestamp": "2026-02-02T12:00:00Z"}],
                "session_inference": {
                    "source": "helpdesk",
                    "primary_intent": "refund",
                    "topics": ["billing", "invoice"],
                    "intent_flow": ["billing", "refund"],
                    "escalation": {"required": false}
                }
            },
            {
                "sessionId": "b",
                "messages": [{"timestamp": "2026-02-02T13:00:00Z"}],
                "session_inference": {
                    "source": "it_support",
                    "primary_intent": "billing",
                    "topics": ["billing"],
                    "escalation": {"required": true}
                }
            }
        ]}"#,
    );

    let mut session = SessionContext::new(DashboardConfig::default()).unwrap();
    session.load(&[json]).unwrap();

    let primary = session.buckets(&RecordFilter::default(), Grouping::PrimaryIntent);
    let keys: Vec<(&str, usize)> = primary.iter().map(|b| (b.key.as_str(), b.count)).collect();
    assert_eq!(keys, vec![("billing", 1), ("refund", 1)]);

    let filter = RecordFilter {
        intents: vec!["billing".to_string()],
        ..RecordFilter::default()
    };
    let selected = session.select(&filter);
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].session_id, "b");

    let table = report::records_table(session.records()).unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.get(0, "intent_count"), Some(&Scalar::Integer(2)));
    assert_eq!(
        table.get(0, "intent_flow"),
        Some(&Scalar::Text("billing -> refund".to_string()))
    );

    let markdown = report::build_report(&session.dashboard(&RecordFilter::default())).unwrap();
    assert!(markdown.contains("## Primary Intents"));
    assert!(markdown.contains("## Sources"));
}
