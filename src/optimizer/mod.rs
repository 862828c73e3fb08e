//! Prompt optimizer seam.
//!
//! The search over prompt variants runs in an external service. This module
//! defines what the crate hands it (a [`ChatPrompt`], the dataset, the
//! objective and a sample budget) and what comes back (an
//! [`OptimizationResult`]). [`RemoteOptimizer`] is the HTTP adapter.

pub mod remote;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::dataset::Dataset;
use crate::scoring::{ScoreError, ScoringFunction};
use crate::utilities::printer::{rule, Printer, PrinterColor};

pub use remote::RemoteOptimizer;

// ---------------------------------------------------------------------------
// Prompt
// ---------------------------------------------------------------------------

/// A two-message chat prompt: system instructions plus the user request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPrompt {
    pub system: String,
    pub user: String,
}

impl ChatPrompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }

    /// The prompt as chat messages, system first.
    pub fn messages(&self) -> Value {
        json!([
            { "role": "system", "content": self.system },
            { "role": "user", "content": self.user },
        ])
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Search parameters forwarded to the optimizer service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerSettings {
    /// Model the optimizer uses to propose and run candidates.
    pub model: String,
    pub prompts_per_round: u32,
    pub n_threads: u32,
    /// Let the optimizer see dataset context when proposing candidates.
    pub enable_context: bool,
    pub temperature: f64,
    pub seed: u64,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            model: "openai/gpt-4o-mini".to_string(),
            prompts_per_round: 4,
            n_threads: 8,
            enable_context: true,
            temperature: 0.0,
            seed: 42,
        }
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// Best candidate after one optimization round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRound {
    pub round: u32,
    pub score: f64,
}

/// Outcome of one optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    /// Optimizer algorithm that produced the result.
    pub optimizer: String,
    pub metric_name: String,
    #[serde(default)]
    pub initial_score: Option<f64>,
    pub score: f64,
    /// Best prompt found.
    pub prompt: ChatPrompt,
    #[serde(default)]
    pub history: Vec<OptimizationRound>,
    #[serde(default)]
    pub details: Map<String, Value>,
}

impl OptimizationResult {
    /// Relative change from the initial score, in percent. `None` without an
    /// initial score or when it is zero.
    pub fn improvement(&self) -> Option<f64> {
        let initial = self.initial_score?;
        if initial == 0.0 {
            return None;
        }
        Some((self.score - initial) / initial.abs() * 100.0)
    }

    /// Human-readable summary, colored through `printer`.
    pub fn render(&self, printer: &Printer) -> String {
        let mut lines = vec![
            rule(),
            printer.paint(
                &format!("Optimization result ({})", self.optimizer),
                PrinterColor::BoldCyan,
            ),
            rule(),
            format!("Metric:        {}", self.metric_name),
        ];

        match self.initial_score {
            Some(initial) => lines.push(format!("Initial score: {:.4}", initial)),
            None => lines.push("Initial score: n/a".to_string()),
        }

        let final_line = format!("Final score:   {:.4}", self.score);
        let final_color = match self.improvement() {
            Some(delta) if delta < 0.0 => PrinterColor::Red,
            _ => PrinterColor::Green,
        };
        lines.push(printer.paint(&final_line, final_color));

        if let Some(delta) = self.improvement() {
            lines.push(format!("Improvement:   {:+.2}%", delta));
        }
        if !self.history.is_empty() {
            lines.push(format!("Rounds:        {}", self.history.len()));
        }

        lines.push(String::new());
        lines.push(printer.paint("System prompt:", PrinterColor::BoldWhite));
        lines.push(self.prompt.system.clone());
        lines.push(String::new());
        lines.push(printer.paint("User prompt:", PrinterColor::BoldWhite));
        lines.push(self.prompt.user.clone());
        lines.push(rule());

        lines.join("\n")
    }

    /// Print the summary to stdout.
    pub fn display(&self, printer: &Printer) {
        printer.println(&self.render(printer));
    }
}

impl fmt::Display for OptimizationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(&Printer::plain()))
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while running an optimization.
#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error("Optimizer request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Optimizer returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode optimizer response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The service gave up on the run.
    #[error("Optimization failed: {0}")]
    Failed(String),

    /// A trial refers to an item that is not in the dataset.
    #[error("Trial {trial_id} refers to unknown dataset item {item_id}")]
    UnknownItem { trial_id: String, item_id: String },

    #[error("Scoring trial {trial_id} failed: {source}")]
    Scoring {
        trial_id: String,
        #[source]
        source: ScoreError,
    },

    #[error("Invalid optimizer configuration: {0}")]
    InvalidConfig(String),
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Searches for a better prompt against a dataset and an objective.
#[async_trait]
pub trait OptimizerService: Send + Sync {
    /// Optimize `prompt`, scoring candidates on `dataset` with `objective`.
    /// `n_samples` bounds how many dataset items each evaluation uses.
    async fn optimize_prompt(
        &self,
        prompt: &ChatPrompt,
        dataset: &Dataset,
        objective: &dyn ScoringFunction,
        n_samples: usize,
    ) -> Result<OptimizationResult, OptimizerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(initial: Option<f64>, score: f64) -> OptimizationResult {
        OptimizationResult {
            optimizer: "MetaPromptOptimizer".to_string(),
            metric_name: "relevance_cost_duration".to_string(),
            initial_score: initial,
            score,
            prompt: ChatPrompt::new("You are a career coach.", "Suggest skills."),
            history: vec![],
            details: Map::new(),
        }
    }

    #[test]
    fn test_default_settings() {
        let settings = OptimizerSettings::default();
        assert_eq!(settings.model, "openai/gpt-4o-mini");
        assert_eq!(settings.n_threads, 8);
        assert!(settings.enable_context);
        assert_eq!(settings.temperature, 0.0);
    }

    #[test]
    fn test_messages_order() {
        let messages = ChatPrompt::new("sys", "usr").messages();
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["content"], "usr");
    }

    #[test]
    fn test_improvement() {
        assert_eq!(result(None, 0.8).improvement(), None);
        assert_eq!(result(Some(0.0), 0.8).improvement(), None);
        let delta = result(Some(0.5), 0.75).improvement().unwrap();
        assert!((delta - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_plain_render() {
        let text = result(Some(0.5), 0.75).to_string();
        assert!(text.contains("Optimization result (MetaPromptOptimizer)"));
        assert!(text.contains("Metric:        relevance_cost_duration"));
        assert!(text.contains("Final score:   0.7500"));
        assert!(text.contains("Improvement:   +50.00%"));
        assert!(text.contains("You are a career coach."));
        assert!(!text.contains('\u{1b}'));
    }

    #[test]
    fn test_decode_minimal_result() {
        let result: OptimizationResult = serde_json::from_value(json!({
            "optimizer": "MetaPromptOptimizer",
            "metric_name": "answer_relevance",
            "score": 0.9,
            "prompt": {"system": "s", "user": "u"}
        }))
        .unwrap();
        assert_eq!(result.initial_score, None);
        assert!(result.history.is_empty());
    }
}
