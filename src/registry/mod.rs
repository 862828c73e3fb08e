//! Prompt and dataset registry.
//!
//! Prompts and evaluation datasets live in an external registry. Jobs only
//! read from it, through the [`PromptRegistry`] trait:
//! - [`OpikRegistry`] talks to the Opik REST API
//! - [`InMemoryRegistry`] serves fixed prompts and datasets (tests, dry runs)

pub mod opik;

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::dataset::{Dataset, DatasetError};
use crate::template::PromptTemplate;

pub use opik::OpikRegistry;

/// Errors raised while reading from the registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No prompt with this name exists.
    #[error("Prompt not found: {0}")]
    PromptNotFound(String),

    /// No dataset with this name exists.
    #[error("Dataset not found: {0}")]
    DatasetNotFound(String),

    /// Transport-level failure.
    #[error("Registry request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The registry answered with a non-success status.
    #[error("Registry returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// A response body could not be decoded.
    #[error("Failed to decode registry response: {0}")]
    Decode(#[from] serde_json::Error),

    /// A dataset item does not match the record schema.
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    /// Registry settings are unusable.
    #[error("Invalid registry configuration: {0}")]
    InvalidConfig(String),
}

/// Read access to stored prompts and datasets.
#[async_trait]
pub trait PromptRegistry: Send + Sync {
    /// Fetch the latest version of the prompt called `name`.
    async fn get_prompt(&self, name: &str) -> Result<PromptTemplate, RegistryError>;

    /// Fetch the dataset called `name` with all of its items, in order.
    async fn get_dataset(&self, name: &str) -> Result<Dataset, RegistryError>;
}

/// Registry backed by in-process maps.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRegistry {
    prompts: HashMap<String, PromptTemplate>,
    datasets: HashMap<String, Dataset>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a prompt under its own name.
    pub fn with_prompt(mut self, prompt: PromptTemplate) -> Self {
        self.prompts.insert(prompt.name.clone(), prompt);
        self
    }

    /// Register a dataset under its own name.
    pub fn with_dataset(mut self, dataset: Dataset) -> Self {
        self.datasets.insert(dataset.name.clone(), dataset);
        self
    }
}

#[async_trait]
impl PromptRegistry for InMemoryRegistry {
    async fn get_prompt(&self, name: &str) -> Result<PromptTemplate, RegistryError> {
        self.prompts
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::PromptNotFound(name.to_string()))
    }

    async fn get_dataset(&self, name: &str) -> Result<Dataset, RegistryError> {
        self.datasets
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::DatasetNotFound(name.to_string()))
    }
}
