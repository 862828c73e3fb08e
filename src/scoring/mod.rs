//! Scoring functions.
//!
//! A scoring function maps `(dataset item, candidate output, execution span)`
//! to a scalar. Three kinds exist:
//! - [`RelevanceScorer`] asks an external judge how relevant the output is
//! - [`CostScorer`] reads the span's estimated cost, in cents
//! - [`DurationScorer`] reads the span's wall-clock duration, in seconds
//!
//! Objectives (see [`crate::objective`]) are scoring functions too.

pub mod judge;
pub mod relevance;
pub mod telemetry;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dataset::{DatasetItem, MissingFieldError};

pub use judge::{ChatCompletionsJudge, JudgeVerdict, RelevanceJudge};
pub use relevance::{ContextBuilder, RelevanceScorer};
pub use telemetry::{CostScorer, DurationScorer, TaskSpan};

// ---------------------------------------------------------------------------
// Score result
// ---------------------------------------------------------------------------

/// The value produced by one scoring function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    /// Name of the scoring function that produced the value.
    pub name: String,
    pub value: f64,
    /// Judge feedback or component breakdown, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ScoreResult {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: Option<String>) -> Self {
        self.reason = reason;
        self
    }
}

impl fmt::Display for ScoreResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:.4}", self.name, self.value)?;
        if let Some(ref reason) = self.reason {
            write!(f, " ({})", reason)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while scoring a candidate output.
#[derive(Debug, Error)]
pub enum ScoreError {
    /// The dataset item lacks a field the scoring context needs.
    #[error(transparent)]
    MissingField(#[from] MissingFieldError),

    /// The metric needs execution telemetry the optimizer did not supply.
    #[error("Metric `{metric}` needs execution telemetry: {detail}")]
    MissingTelemetry { metric: String, detail: String },

    /// The relevance judge failed or answered with something unusable.
    #[error("Relevance judge failed: {0}")]
    Judge(String),

    /// The item input could not be serialized for the judge.
    #[error("Failed to serialize item input: {0}")]
    Serialize(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A function that scores one candidate output for one dataset item.
#[async_trait]
pub trait ScoringFunction: Send + Sync {
    /// Metric name reported with every score.
    fn name(&self) -> &str;

    /// Score `output` produced for `item`. `span` is the execution telemetry
    /// of the call that produced it, when the optimizer recorded one.
    async fn score(
        &self,
        item: &DatasetItem,
        output: &str,
        span: Option<&TaskSpan>,
    ) -> Result<ScoreResult, ScoreError>;
}

/// A shared, type-erased scoring function; what jobs hand to the optimizer.
pub type Objective = Arc<dyn ScoringFunction>;
