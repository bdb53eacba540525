use serde::Serialize;
use tracing::debug;

use crate::config::invalid;
use crate::error::ConfigError;
use crate::models::{SpikeAlert, ThresholdBreach, TimeBucket};

/// Validated parameters for rolling-baseline spike detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpikeConfig {
    baseline_window: usize,
    threshold_multiplier: f64,
}

impl SpikeConfig {
    pub fn new(baseline_window: usize, threshold_multiplier: f64) -> Result<Self, ConfigError> {
        if baseline_window < 1 {
            return Err(invalid("baseline_window", "must be at least 1"));
        }
        if !threshold_multiplier.is_finite() || threshold_multiplier <= 0.0 {
            return Err(invalid(
                "threshold_multiplier",
                format!("must be a positive number, got {threshold_multiplier}"),
            ));
        }

        Ok(Self {
            baseline_window,
            threshold_multiplier,
        })
    }

    pub fn baseline_window(&self) -> usize {
        self.baseline_window
    }

    pub fn threshold_multiplier(&self) -> f64 {
        self.threshold_multiplier
    }

    /// Whether `observed` counts as a spike over `baseline`.
    ///
    /// A zero baseline triggers on any non-zero observation.
    pub fn is_spike(&self, observed: f64, baseline: f64) -> bool {
        if baseline > 0.0 {
            observed > baseline * self.threshold_multiplier
        } else {
            observed > 0.0
        }
    }
}

/// Evaluate every bucket that has a full baseline window behind it.
///
/// `series` must be in chronological order. Buckets before `baseline_window`
/// are not evaluated and produce no alert.
pub fn detect_spikes(series: &[TimeBucket], config: &SpikeConfig) -> Vec<SpikeAlert> {
    let window = config.baseline_window();
    let mut alerts = Vec::with_capacity(series.len().saturating_sub(window));

    for index in window..series.len() {
        let history = &series[index - window..index];
        let baseline =
            history.iter().map(|bucket| bucket.escalation_rate).sum::<f64>() / window as f64;
        let current = &series[index];
        let triggered = config.is_spike(current.escalation_rate, baseline);

        if triggered {
            debug!(
                period = %current.period,
                observed = current.escalation_rate,
                baseline,
                "escalation spike"
            );
        }

        alerts.push(SpikeAlert {
            period: current.period,
            index,
            observed_rate: current.escalation_rate,
            baseline_rate: baseline,
            triggered,
        });
    }

    alerts
}

/// Buckets whose escalation rate reaches a fixed threshold, in series order.
pub fn threshold_breaches(series: &[TimeBucket], threshold: f64) -> Vec<ThresholdBreach> {
    series
        .iter()
        .filter(|bucket| bucket.escalation_rate >= threshold)
        .map(|bucket| ThresholdBreach {
            period: bucket.period,
            sessions: bucket.sessions,
            escalation_rate: bucket.escalation_rate,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn series(rates: &[f64]) -> Vec<TimeBucket> {
        let start = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        rates
            .iter()
            .enumerate()
            .map(|(i, rate)| TimeBucket {
                period: start + Duration::days(i as i64),
                sessions: 10,
                escalated: (rate * 10.0).round() as usize,
                escalation_rate: *rate,
                avg_complexity: None,
                avg_resolution: None,
            })
            .collect()
    }

    #[test]
    fn flags_jump_over_stable_baseline() {
        let config = SpikeConfig::new(4, 2.0).unwrap();
        let alerts = detect_spikes(&series(&[0.1, 0.1, 0.1, 0.1, 0.9]), &config);

        assert_eq!(alerts.len(), 1);
        let alert = &alerts[0];
        assert_eq!(alert.index, 4);
        assert_eq!(alert.period, NaiveDate::from_ymd_opt(2026, 2, 5).unwrap());
        assert!((alert.baseline_rate - 0.1).abs() < 1e-9);
        assert!((alert.observed_rate - 0.9).abs() < 1e-9);
        assert!(alert.triggered);
    }

    #[test]
    fn zero_baseline_with_zero_rate_does_not_trigger() {
        let config = SpikeConfig::new(4, 2.0).unwrap();
        let alerts = detect_spikes(&series(&[0.0, 0.0, 0.0, 0.0, 0.0]), &config);

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].baseline_rate, 0.0);
        assert!(!alerts[0].triggered);
    }

    #[test]
    fn zero_baseline_triggers_on_any_escalation() {
        let config = SpikeConfig::new(2, 5.0).unwrap();
        let alerts = detect_spikes(&series(&[0.0, 0.0, 0.05]), &config);
        assert!(alerts[0].triggered);
    }

    #[test]
    fn rate_equal_to_scaled_baseline_is_not_a_spike() {
        let config = SpikeConfig::new(1, 2.0).unwrap();
        let alerts = detect_spikes(&series(&[0.25, 0.5]), &config);
        assert!(!alerts[0].triggered);
    }

    #[test]
    fn never_alerts_inside_the_warmup_window() {
        let config = SpikeConfig::new(3, 1.5).unwrap();
        let rates = [0.9, 0.0, 0.8, 0.1, 0.7, 0.2, 0.6];
        let alerts = detect_spikes(&series(&rates), &config);

        assert_eq!(alerts.len(), rates.len() - 3);
        assert!(alerts.iter().all(|alert| alert.index >= 3));
    }

    #[test]
    fn short_series_yields_no_alerts() {
        let config = SpikeConfig::new(7, 2.0).unwrap();
        assert!(detect_spikes(&series(&[0.5, 0.6]), &config).is_empty());
        assert!(detect_spikes(&[], &config).is_empty());
    }

    #[test]
    fn baseline_uses_only_the_preceding_window() {
        let config = SpikeConfig::new(2, 2.0).unwrap();
        let alerts = detect_spikes(&series(&[0.8, 0.1, 0.1, 0.3]), &config);

        assert_eq!(alerts.len(), 2);
        assert!((alerts[0].baseline_rate - 0.45).abs() < 1e-9);
        assert!(!alerts[0].triggered);
        assert!((alerts[1].baseline_rate - 0.1).abs() < 1e-9);
        assert!(alerts[1].triggered);
    }

    #[test]
    fn detection_is_deterministic() {
        let config = SpikeConfig::new(2, 1.2).unwrap();
        let data = series(&[0.2, 0.3, 0.5, 0.1, 0.9]);
        assert_eq!(detect_spikes(&data, &config), detect_spikes(&data, &config));
    }

    #[test]
    fn rejects_invalid_parameters() {
        assert!(SpikeConfig::new(0, 2.0).is_err());
        assert!(SpikeConfig::new(3, 0.0).is_err());
        assert!(SpikeConfig::new(3, -1.0).is_err());
        assert!(SpikeConfig::new(3, f64::NAN).is_err());
    }

    #[test]
    fn breaches_include_rates_at_the_threshold() {
        let breaches = threshold_breaches(&series(&[0.1, 0.3, 0.5]), 0.3);
        let rates: Vec<f64> = breaches.iter().map(|b| b.escalation_rate).collect();
        assert_eq!(rates, vec![0.3, 0.5]);
    }
}
