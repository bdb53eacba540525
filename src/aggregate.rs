use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

use crate::models::{
    AggregateBucket, ConversationRecord, Granularity, Grouping, Overview, Source,
    SourceTimeBucket, TimeBucket,
};

/// Group records into buckets ordered by descending count, then key.
///
/// Intents and risk flags fan out: a record contributes one count to each
/// distinct label it carries, so those counts can sum past `records.len()`.
/// Rates are always taken over the total number of records in scope.
pub fn aggregate(records: &[ConversationRecord], grouping: Grouping) -> Vec<AggregateBucket> {
    let mut map: HashMap<String, (usize, usize)> = HashMap::new();

    for record in records {
        for key in bucket_keys(record, grouping) {
            let entry = map.entry(key).or_insert((0, 0));
            entry.0 += 1;
            if record.escalated {
                entry.1 += 1;
            }
        }
    }

    let total = records.len();
    let mut buckets: Vec<AggregateBucket> = map
        .into_iter()
        .map(|(key, (count, escalated))| AggregateBucket {
            key,
            count,
            rate: ratio(count, total),
            escalated,
            escalation_rate: ratio(escalated, count),
        })
        .collect();

    buckets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    buckets
}

/// Keys a single record maps to under `grouping`.
///
/// Multi-valued dimensions yield one key per distinct label; empty values yield none.
fn bucket_keys(record: &ConversationRecord, grouping: Grouping) -> Vec<String> {
    match grouping {
        Grouping::Intent => {
            let mut keys = Vec::with_capacity(record.intents.len());
            for intent in &record.intents {
                if !keys.contains(intent) {
                    keys.push(intent.clone());
                }
            }
            keys
        }
        Grouping::RiskFlag => {
            let mut keys = Vec::with_capacity(record.risk_flags.len());
            for flag in &record.risk_flags {
                if !keys.contains(flag) {
                    keys.push(flag.clone());
                }
            }
            keys
        }
        Grouping::PrimaryIntent => record.primary_intent().map(str::to_string).into_iter().collect(),
        Grouping::Sentiment => vec![record.sentiment.clone()],
        Grouping::Urgency => vec![record.urgency.clone()],
        Grouping::Source => vec![record.source.label().to_string()],
        Grouping::Day => vec![record.date().to_string()],
        Grouping::Week => vec![Granularity::Week.period_of(record.date()).to_string()],
        Grouping::EscalationLevel => record.escalation_level.iter().cloned().collect(),
        Grouping::IntentCount => vec![record.intent_count.to_string()],
        Grouping::DataSource => vec![record.data_source.clone()],
    }
}

/// Per-period volume and escalation statistics in chronological order.
///
/// Periods without records are absent rather than zero-filled.
pub fn time_series(records: &[ConversationRecord], granularity: Granularity) -> Vec<TimeBucket> {
    #[derive(Default)]
    struct Acc {
        sessions: usize,
        escalated: usize,
        complexity: Mean,
        resolution: Mean,
    }

    let mut periods: BTreeMap<NaiveDate, Acc> = BTreeMap::new();

    for record in records {
        let acc = periods
            .entry(granularity.period_of(record.date()))
            .or_default();
        acc.sessions += 1;
        if record.escalated {
            acc.escalated += 1;
        }
        acc.complexity.add(record.complexity_score);
        acc.resolution.add(record.resolution_confidence);
    }

    periods
        .into_iter()
        .map(|(period, acc)| TimeBucket {
            period,
            sessions: acc.sessions,
            escalated: acc.escalated,
            escalation_rate: ratio(acc.escalated, acc.sessions),
            avg_complexity: acc.complexity.value(),
            avg_resolution: acc.resolution.value(),
        })
        .collect()
}

/// Session counts per period and source, ordered by period then source.
pub fn source_series(
    records: &[ConversationRecord],
    granularity: Granularity,
) -> Vec<SourceTimeBucket> {
    let mut counts: BTreeMap<(NaiveDate, Source), usize> = BTreeMap::new();

    for record in records {
        *counts
            .entry((granularity.period_of(record.date()), record.source))
            .or_insert(0) += 1;
    }

    counts
        .into_iter()
        .map(|((period, source), sessions)| SourceTimeBucket {
            period,
            source,
            sessions,
        })
        .collect()
}

pub fn overview(records: &[ConversationRecord]) -> Overview {
    let count_source =
        |source: Source| records.iter().filter(|record| record.source == source).count();
    let escalated = records.iter().filter(|record| record.escalated).count();

    Overview {
        total_sessions: records.len(),
        it_support_sessions: count_source(Source::ItSupport),
        helpdesk_sessions: count_source(Source::Helpdesk),
        escalation_rate: ratio(escalated, records.len()),
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

#[derive(Default)]
struct Mean {
    sum: f64,
    count: usize,
}

impl Mean {
    fn add(&mut self, value: Option<f64>) {
        if let Some(value) = value {
            self.sum += value;
            self.count += 1;
        }
    }

    fn value(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}
