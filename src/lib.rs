//! # meta-optimize
//!
//! Prompt optimization jobs for the learning-path agents.
//!
//! Each job loads a stored system/user prompt pair and an evaluation dataset
//! from the registry, renders the prompts for every dataset item and hands
//! them to an external optimizer service. Candidates are scored locally with
//! an LLM-judged relevance metric, optionally blended with cost and duration
//! into one weighted objective. The `run-all` sequencer runs every job in its
//! own process and reports which ones failed.

pub mod cli;
pub mod config;
pub mod dataset;
pub mod jobs;
pub mod objective;
pub mod optimizer;
pub mod registry;
pub mod scoring;
pub mod sequencer;
pub mod template;
pub mod utilities;

pub use config::OptimizeConfig;
pub use dataset::{Dataset, DatasetItem, MissingFieldError};
pub use jobs::{JobContext, JobError, JobKind, OptimizationJob, OptimizerDriver};
pub use objective::{ObjectiveError, WeightedObjective};
pub use optimizer::{ChatPrompt, OptimizationResult, OptimizerService};
pub use registry::PromptRegistry;
pub use scoring::{ScoreError, ScoreResult, ScoringFunction};
pub use sequencer::{RunAllSequencer, RunSummary};
pub use template::{PromptTemplate, PromptVariables, TemplateRenderError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
