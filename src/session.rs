//! Per-run context: configuration plus one loaded snapshot.
//!
//! Every derived structure is recomputed from the snapshot on demand; nothing
//! is cached between renders and nothing is shared between sessions.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::aggregate;
use crate::config::DashboardConfig;
use crate::error::{ConfigError, Result};
use crate::filter::RecordFilter;
use crate::loader;
use crate::models::{
    AggregateBucket, ConversationRecord, Granularity, Grouping, Overview, SourceTimeBucket,
    SpikeAlert, ThresholdBreach, TimeBucket,
};
use crate::spike::{self, SpikeConfig};

#[derive(Debug, Clone)]
pub struct SessionContext {
    run_id: Uuid,
    config: DashboardConfig,
    spike: SpikeConfig,
    records: Vec<ConversationRecord>,
}

/// Everything one render of the dashboard needs.
#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub run_id: Uuid,
    pub granularity: Granularity,
    pub spike: SpikeConfig,
    pub alert_threshold: f64,
    pub overview: Overview,
    pub intents: Vec<AggregateBucket>,
    pub primary_intents: Vec<AggregateBucket>,
    pub intent_counts: Vec<AggregateBucket>,
    pub sentiment: Vec<AggregateBucket>,
    pub urgency: Vec<AggregateBucket>,
    pub sources: Vec<AggregateBucket>,
    pub risk_flags: Vec<AggregateBucket>,
    pub escalation_levels: Vec<AggregateBucket>,
    pub series: Vec<TimeBucket>,
    pub source_series: Vec<SourceTimeBucket>,
    pub alerts: Vec<SpikeAlert>,
    pub breaches: Vec<ThresholdBreach>,
}

impl SessionContext {
    /// Validate the configuration and start with an empty snapshot.
    pub fn new(config: DashboardConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let spike = config.spike_config()?;

        Ok(Self {
            run_id: Uuid::new_v4(),
            config,
            spike,
            records: Vec::new(),
        })
    }

    pub fn with_records(mut self, records: Vec<ConversationRecord>) -> Self {
        self.records = records;
        self
    }

    /// Replace the snapshot with the contents of `paths`.
    ///
    /// On error the previous snapshot is left untouched.
    pub fn load<P: AsRef<Path>>(&mut self, paths: &[P]) -> Result<usize> {
        let records = loader::load_paths(paths, &self.config.columns())?;
        info!(run_id = %self.run_id, records = records.len(), "snapshot loaded");
        self.records = records;
        Ok(self.records.len())
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn records(&self) -> &[ConversationRecord] {
        &self.records
    }

    pub fn select(&self, filter: &RecordFilter) -> Vec<ConversationRecord> {
        if filter.is_empty() {
            return self.records.clone();
        }
        let selected = filter.apply(&self.records);
        debug!(
            run_id = %self.run_id,
            kept = selected.len(),
            total = self.records.len(),
            "filter applied"
        );
        selected
    }

    pub fn buckets(&self, filter: &RecordFilter, grouping: Grouping) -> Vec<AggregateBucket> {
        aggregate::aggregate(&self.select(filter), grouping)
    }

    /// One full pass: filter, aggregate, detect.
    pub fn dashboard(&self, filter: &RecordFilter) -> Dashboard {
        let records = self.select(filter);
        let granularity = self.config.granularity;
        let series = aggregate::time_series(&records, granularity);
        let alerts = spike::detect_spikes(&series, &self.spike);
        let breaches = spike::threshold_breaches(&series, self.config.alert_threshold);

        info!(
            run_id = %self.run_id,
            sessions = records.len(),
            buckets = series.len(),
            spikes = alerts.iter().filter(|alert| alert.triggered).count(),
            "dashboard computed"
        );

        Dashboard {
            run_id: self.run_id,
            granularity,
            spike: self.spike,
            alert_threshold: self.config.alert_threshold,
            overview: aggregate::overview(&records),
            intents: aggregate::aggregate(&records, Grouping::Intent),
            primary_intents: aggregate::aggregate(&records, Grouping::PrimaryIntent),
            intent_counts: aggregate::aggregate(&records, Grouping::IntentCount),
            sentiment: aggregate::aggregate(&records, Grouping::Sentiment),
            urgency: aggregate::aggregate(&records, Grouping::Urgency),
            sources: aggregate::aggregate(&records, Grouping::Source),
            risk_flags: aggregate::aggregate(&records, Grouping::RiskFlag),
            escalation_levels: aggregate::aggregate(&records, Grouping::EscalationLevel),
            source_series: aggregate::source_series(&records, granularity),
            series,
            alerts,
            breaches,
        }
    }
}
