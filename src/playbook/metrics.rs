// src/playbook/metrics.rs — Pure metric update functions
//
// Metric recomputation is expressed as old metrics + observation -> new
// metrics, returned and then persisted by the caller. Nothing here mutates
// in place.

use chrono::{DateTime, Utc};

use super::types::PlaybookMetrics;

/// Smoothing factor for the success-rate exponential moving average.
pub const EMA_ALPHA: f64 = 0.2;

/// One observed execution of a playbook.
#[derive(Debug, Clone, Default)]
pub struct ExecutionObservation {
    pub success: bool,
    pub outcome_score: Option<f64>,
    pub duration_ms: Option<u64>,
    pub satisfaction: Option<f64>,
}

impl ExecutionObservation {
    pub fn success() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn failure() -> Self {
        Self::default()
    }
}

/// Exponential moving average of the success rate, clamped to [0, 1].
pub fn ema_success_rate(prev: f64, success: bool) -> f64 {
    let observed = if success { 1.0 } else { 0.0 };
    (EMA_ALPHA * observed + (1.0 - EMA_ALPHA) * prev).clamp(0.0, 1.0)
}

/// Fold one execution into the metrics.
pub fn record_execution(
    metrics: &PlaybookMetrics,
    obs: &ExecutionObservation,
    now: DateTime<Utc>,
) -> PlaybookMetrics {
    let prev_count = metrics.usage_count as f64;

    let avg_outcome_score = match obs.outcome_score {
        Some(score) => running_mean(metrics.avg_outcome_score, prev_count, score),
        None => metrics.avg_outcome_score,
    };
    let avg_execution_time_ms = match obs.duration_ms {
        Some(ms) => running_mean(metrics.avg_execution_time_ms, prev_count, ms as f64),
        None => metrics.avg_execution_time_ms,
    };
    let user_satisfaction = match obs.satisfaction {
        Some(s) => running_mean(metrics.user_satisfaction, prev_count, s),
        None => metrics.user_satisfaction,
    };

    PlaybookMetrics {
        usage_count: metrics.usage_count + 1,
        success_rate: ema_success_rate(metrics.success_rate, obs.success),
        avg_outcome_score,
        avg_execution_time_ms,
        last_used: Some(now),
        user_satisfaction,
    }
}

/// Fold the loser's metrics into the keeper's as a usage-weighted average.
/// Usage counts are summed; `last_used` takes the later of the two.
pub fn merge_metrics(keeper: &PlaybookMetrics, loser: &PlaybookMetrics) -> PlaybookMetrics {
    let wk = keeper.usage_count as f64;
    let wl = loser.usage_count as f64;

    PlaybookMetrics {
        usage_count: keeper.usage_count + loser.usage_count,
        success_rate: weighted(keeper.success_rate, wk, loser.success_rate, wl).clamp(0.0, 1.0),
        avg_outcome_score: weighted(keeper.avg_outcome_score, wk, loser.avg_outcome_score, wl),
        avg_execution_time_ms: weighted(
            keeper.avg_execution_time_ms,
            wk,
            loser.avg_execution_time_ms,
            wl,
        ),
        last_used: keeper.last_used.max(loser.last_used),
        user_satisfaction: weighted(keeper.user_satisfaction, wk, loser.user_satisfaction, wl),
    }
}

fn running_mean(prev_mean: f64, prev_count: f64, value: f64) -> f64 {
    (prev_mean * prev_count + value) / (prev_count + 1.0)
}

fn weighted(a: f64, wa: f64, b: f64, wb: f64) -> f64 {
    if wa + wb == 0.0 {
        // No usage on either side; plain mean.
        (a + b) / 2.0
    } else {
        (a * wa + b * wb) / (wa + wb)
    }
}
