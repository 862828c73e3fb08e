//! Weighted multi-metric objectives.
//!
//! A [`WeightedObjective`] blends several scoring functions into one scalar to
//! be maximized: `Σ weight_i * score_i`. Weight signs carry direction, so
//! relevance gets a positive weight while cost and duration get negative ones.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::dataset::DatasetItem;
use crate::scoring::{
    CostScorer, DurationScorer, Objective, ScoreError, ScoreResult, ScoringFunction, TaskSpan,
};

/// Name of the canonical relevance/cost/duration objective.
pub const RELEVANCE_COST_DURATION: &str = "relevance_cost_duration";
pub const RELEVANCE_WEIGHT: f64 = 1.0;
pub const COST_WEIGHT: f64 = -0.25;
pub const DURATION_WEIGHT: f64 = -0.25;

/// Errors raised while constructing an objective.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObjectiveError {
    #[error("objective needs one weight per metric: got {metrics} metrics and {weights} weights")]
    LengthMismatch { metrics: usize, weights: usize },
}

/// Weighted sum of scoring functions.
#[derive(Clone)]
pub struct WeightedObjective {
    name: String,
    components: Vec<(Objective, f64)>,
}

impl fmt::Debug for WeightedObjective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeightedObjective")
            .field("name", &self.name)
            .field("metrics", &self.metric_names())
            .field("weights", &self.weights())
            .finish()
    }
}

impl WeightedObjective {
    /// Pair `metrics` with `weights` by position.
    ///
    /// # Errors
    /// [`ObjectiveError::LengthMismatch`] when the lists differ in length.
    pub fn new(
        name: impl Into<String>,
        metrics: Vec<Objective>,
        weights: Vec<f64>,
    ) -> Result<Self, ObjectiveError> {
        if metrics.len() != weights.len() {
            return Err(ObjectiveError::LengthMismatch {
                metrics: metrics.len(),
                weights: weights.len(),
            });
        }
        Ok(Self {
            name: name.into(),
            components: metrics.into_iter().zip(weights).collect(),
        })
    }

    /// `relevance - 0.25 * cost_in_cents - 0.25 * duration_seconds`.
    pub fn relevance_cost_duration(relevance: Objective) -> Self {
        Self {
            name: RELEVANCE_COST_DURATION.to_string(),
            components: vec![
                (relevance, RELEVANCE_WEIGHT),
                (Arc::new(CostScorer), COST_WEIGHT),
                (Arc::new(DurationScorer), DURATION_WEIGHT),
            ],
        }
    }

    pub fn weights(&self) -> Vec<f64> {
        self.components.iter().map(|(_, w)| *w).collect()
    }

    pub fn metric_names(&self) -> Vec<String> {
        self.components
            .iter()
            .map(|(metric, _)| metric.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

#[async_trait]
impl ScoringFunction for WeightedObjective {
    fn name(&self) -> &str {
        &self.name
    }

    async fn score(
        &self,
        item: &DatasetItem,
        output: &str,
        span: Option<&TaskSpan>,
    ) -> Result<ScoreResult, ScoreError> {
        let mut total = 0.0;
        let mut breakdown = Vec::with_capacity(self.components.len());

        for (metric, weight) in &self.components {
            let component = metric.score(item, output, span).await?;
            total += weight * component.value;
            breakdown.push(format!(
                "{}={:.4} (weight {})",
                component.name, component.value, weight
            ));
        }

        log::debug!("{} = {:.4} [{}]", self.name, total, breakdown.join(", "));
        Ok(ScoreResult::new(self.name.clone(), total).with_reason(Some(breakdown.join(", "))))
    }
}
