//! Cost and duration metrics read from execution telemetry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ScoreError, ScoreResult, ScoringFunction};
use crate::dataset::DatasetItem;

/// Dollars to cents.
const CENTS_PER_UNIT: f64 = 100.0;

/// Execution telemetry for the call that produced a candidate output.
///
/// Child spans cover nested LLM or tool calls; their cost counts towards the
/// task's total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpan {
    pub name: String,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Estimated cost of this span alone, in currency units.
    #[serde(default)]
    pub total_estimated_cost: Option<f64>,
    #[serde(default)]
    pub children: Vec<TaskSpan>,
}

impl TaskSpan {
    pub fn new(name: impl Into<String>, start_time: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            start_time,
            end_time: None,
            total_estimated_cost: None,
            children: Vec::new(),
        }
    }

    /// Summed cost of this span and all descendants. Spans without pricing
    /// data count as zero.
    pub fn total_cost(&self) -> f64 {
        self.total_estimated_cost.unwrap_or(0.0)
            + self.children.iter().map(TaskSpan::total_cost).sum::<f64>()
    }

    /// Wall-clock duration in seconds; `None` while the span is open.
    pub fn duration_seconds(&self) -> Option<f64> {
        let end = self.end_time?;
        let elapsed = end.signed_duration_since(self.start_time);
        elapsed
            .num_microseconds()
            .map(|us| us as f64 / 1_000_000.0)
            .or_else(|| Some(elapsed.num_milliseconds() as f64 / 1_000.0))
    }
}

fn require_span<'a>(metric: &str, span: Option<&'a TaskSpan>) -> Result<&'a TaskSpan, ScoreError> {
    span.ok_or_else(|| ScoreError::MissingTelemetry {
        metric: metric.to_string(),
        detail: "no task span recorded".to_string(),
    })
}

/// Estimated cost of the task span, in cents.
#[derive(Debug, Clone, Default)]
pub struct CostScorer;

impl CostScorer {
    pub const NAME: &'static str = "cost_in_cents";
}

#[async_trait]
impl ScoringFunction for CostScorer {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn score(
        &self,
        _item: &DatasetItem,
        _output: &str,
        span: Option<&TaskSpan>,
    ) -> Result<ScoreResult, ScoreError> {
        let span = require_span(Self::NAME, span)?;
        Ok(ScoreResult::new(Self::NAME, span.total_cost() * CENTS_PER_UNIT))
    }
}

/// Duration of the task span, in seconds.
#[derive(Debug, Clone, Default)]
pub struct DurationScorer;

impl DurationScorer {
    pub const NAME: &'static str = "duration_seconds";
}

#[async_trait]
impl ScoringFunction for DurationScorer {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn score(
        &self,
        _item: &DatasetItem,
        _output: &str,
        span: Option<&TaskSpan>,
    ) -> Result<ScoreResult, ScoreError> {
        let span = require_span(Self::NAME, span)?;
        let seconds = span
            .duration_seconds()
            .ok_or_else(|| ScoreError::MissingTelemetry {
                metric: Self::NAME.to_string(),
                detail: format!("span `{}` has not ended", span.name),
            })?;
        Ok(ScoreResult::new(Self::NAME, seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn finished_span() -> TaskSpan {
        let mut llm_call = TaskSpan::new("llm", start());
        llm_call.total_estimated_cost = Some(0.0012);
        llm_call.end_time = Some(start() + Duration::milliseconds(900));

        let mut span = TaskSpan::new("task", start());
        span.end_time = Some(start() + Duration::milliseconds(1500));
        span.total_estimated_cost = Some(0.0003);
        span.children.push(llm_call);
        span
    }

    #[tokio::test]
    async fn test_cost_is_scaled_to_cents() {
        let span = finished_span();
        let score = CostScorer
            .score(&DatasetItem::default(), "", Some(&span))
            .await
            .unwrap();
        assert_eq!(score.name, "cost_in_cents");
        assert!((score.value - 0.15).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_duration_is_unscaled_seconds() {
        let span = finished_span();
        let score = DurationScorer
            .score(&DatasetItem::default(), "", Some(&span))
            .await
            .unwrap();
        assert!((score.value - 1.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_missing_span_is_an_error() {
        let err = CostScorer
            .score(&DatasetItem::default(), "", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ScoreError::MissingTelemetry { ref metric, .. } if metric == "cost_in_cents"));
    }

    #[tokio::test]
    async fn test_open_span_has_no_duration() {
        let span = TaskSpan::new("task", start());
        let err = DurationScorer
            .score(&DatasetItem::default(), "", Some(&span))
            .await
            .unwrap_err();
        assert!(matches!(err, ScoreError::MissingTelemetry { .. }));
    }

    #[tokio::test]
    async fn test_unpriced_span_costs_nothing() {
        let mut span = TaskSpan::new("task", start());
        span.children.push(TaskSpan::new("self-hosted-llm", start()));
        assert_eq!(span.total_cost(), 0.0);

        let score = CostScorer
            .score(&DatasetItem::default(), "", Some(&span))
            .await
            .unwrap();
        assert_eq!(score.value, 0.0);
    }

    #[test]
    fn test_span_decodes_from_json() {
        let span: TaskSpan = serde_json::from_value(serde_json::json!({
            "name": "task",
            "start_time": "2026-03-01T12:00:00Z",
            "end_time": "2026-03-01T12:00:02.250Z",
            "total_estimated_cost": 0.01
        }))
        .unwrap();
        assert_eq!(span.duration_seconds(), Some(2.25));
        assert_eq!(span.total_cost(), 0.01);
    }
}
