//! Error type for optimization jobs.

use thiserror::Error;

use crate::dataset::MissingFieldError;
use crate::optimizer::OptimizerError;
use crate::registry::RegistryError;
use crate::scoring::ScoreError;
use crate::template::TemplateRenderError;

/// Anything that aborts a job.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Template(#[from] TemplateRenderError),

    #[error(transparent)]
    MissingField(#[from] MissingFieldError),

    #[error(transparent)]
    Optimizer(#[from] OptimizerError),

    #[error(transparent)]
    Score(#[from] ScoreError),

    /// The user message could not be serialized.
    #[error("Failed to serialize prompt input: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A challenge item names a difficulty with no description.
    #[error("Item `{item}` has unknown difficulty `{difficulty}` (expected easy, medium or hard)")]
    UnknownDifficulty { item: String, difficulty: String },

    /// A job that optimizes the leading items found none.
    #[error("Dataset `{0}` has no items")]
    EmptyDataset(String),

    /// The job needs a prompt template it was not given.
    #[error("Job `{job}` has no {role} prompt template")]
    MissingTemplate { job: String, role: &'static str },
}
