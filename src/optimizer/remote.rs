//! HTTP client for the optimizer service.
//!
//! The service owns candidate generation and model inference; scoring stays
//! local because the objective is a Rust value. A run is an ask/tell session:
//!
//! 1. `POST /v1/optimizations` creates the run and returns its id.
//! 2. `POST /v1/optimizations/{id}/ask` returns the next batch of trials to
//!    score, or the final result once the search is done.
//! 3. `POST /v1/optimizations/{id}/tell` reports the scores for a batch.
//!
//! Steps 2 and 3 repeat until `ask` reports `completed` or `failed`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{ChatPrompt, OptimizationResult, OptimizerError, OptimizerService, OptimizerSettings};
use crate::config::OptimizerServiceSettings;
use crate::dataset::{Dataset, DatasetItem};
use crate::scoring::{ScoringFunction, TaskSpan};

/// Optimizer algorithm requested from the service.
pub const OPTIMIZER_ALGORITHM: &str = "MetaPromptOptimizer";

/// Wait between `ask` calls while the service has no trials ready.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CreateResponse {
    id: String,
}

/// One candidate output the service wants scored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Trial {
    pub trial_id: String,
    /// Key of the dataset item the output was produced for.
    pub item_id: String,
    pub output: String,
    #[serde(default)]
    pub span: Option<TaskSpan>,
}

/// Score reported back for one trial.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrialScore {
    pub trial_id: String,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum AskResponse {
    Running {
        #[serde(default)]
        trials: Vec<Trial>,
    },
    Completed {
        result: OptimizationResult,
    },
    Failed {
        #[serde(default)]
        error: Option<String>,
    },
}

/// Request body that opens an optimization run.
pub fn build_create_body(
    settings: &OptimizerSettings,
    prompt: &ChatPrompt,
    dataset: &Dataset,
    metric: &str,
    n_samples: usize,
) -> Value {
    let items: Vec<Value> = dataset
        .items()
        .iter()
        .enumerate()
        .filter_map(|(index, item)| {
            let key = dataset.item_key(index)?;
            Some(json!({ "id": key, "data": item }))
        })
        .collect();

    json!({
        "optimizer": OPTIMIZER_ALGORITHM,
        "settings": settings,
        "prompt": { "messages": prompt.messages() },
        "dataset": {
            "name": dataset.name,
            "id": dataset.id,
            "items": items,
        },
        "metric": metric,
        "n_samples": n_samples,
    })
}

/// Score a batch of trials against `dataset` with `objective`.
///
/// Trials are scored in the order given; the first unknown item or scoring
/// failure aborts the batch.
pub async fn score_trials(
    dataset: &Dataset,
    objective: &dyn ScoringFunction,
    trials: &[Trial],
) -> Result<Vec<TrialScore>, OptimizerError> {
    let by_key: HashMap<String, &DatasetItem> = dataset
        .items()
        .iter()
        .enumerate()
        .filter_map(|(index, item)| dataset.item_key(index).map(|key| (key, item)))
        .collect();

    let mut scores = Vec::with_capacity(trials.len());
    for trial in trials {
        let item = by_key
            .get(&trial.item_id)
            .ok_or_else(|| OptimizerError::UnknownItem {
                trial_id: trial.trial_id.clone(),
                item_id: trial.item_id.clone(),
            })?;

        let score = objective
            .score(item, &trial.output, trial.span.as_ref())
            .await
            .map_err(|source| OptimizerError::Scoring {
                trial_id: trial.trial_id.clone(),
                source,
            })?;

        log::debug!("trial {} on {}: {}", trial.trial_id, trial.item_id, score);
        scores.push(TrialScore {
            trial_id: trial.trial_id.clone(),
            value: score.value,
            reason: score.reason,
        });
    }
    Ok(scores)
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// [`OptimizerService`] reached over HTTP.
#[derive(Debug, Clone)]
pub struct RemoteOptimizer {
    base_url: String,
    api_key: Option<String>,
    settings: OptimizerSettings,
    poll_interval: Duration,
    client: reqwest::Client,
}

impl RemoteOptimizer {
    pub fn from_settings(
        settings: &OptimizerServiceSettings,
        timeout: Duration,
    ) -> Result<Self, OptimizerError> {
        if settings.base_url.trim().is_empty() {
            return Err(OptimizerError::InvalidConfig(
                "optimizer base_url is empty".to_string(),
            ));
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            settings: settings.settings.clone(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            client,
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn settings(&self) -> &OptimizerSettings {
        &self.settings
    }

    fn post(&self, path: &str) -> RequestBuilder {
        let url = format!("{}/v1/optimizations{}", self.base_url, path);
        let request = self.client.post(url);
        match self.api_key {
            Some(ref key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, OptimizerError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(OptimizerError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn tell(&self, run_id: &str, scores: &[TrialScore]) -> Result<(), OptimizerError> {
        let response = self
            .post(&format!("/{}/tell", run_id))
            .json(&json!({ "scores": scores }))
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(OptimizerError::Status {
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        })
    }
}

#[async_trait]
impl OptimizerService for RemoteOptimizer {
    async fn optimize_prompt(
        &self,
        prompt: &ChatPrompt,
        dataset: &Dataset,
        objective: &dyn ScoringFunction,
        n_samples: usize,
    ) -> Result<OptimizationResult, OptimizerError> {
        let body = build_create_body(&self.settings, prompt, dataset, objective.name(), n_samples);
        let created: CreateResponse = self.send_json(self.post("").json(&body)).await?;
        log::info!(
            "Started optimization {} on dataset {} (metric {}, n_samples {})",
            created.id,
            dataset.name,
            objective.name(),
            n_samples
        );

        let mut scored = 0usize;
        loop {
            let ask: AskResponse = self
                .send_json(self.post(&format!("/{}/ask", created.id)))
                .await?;

            match ask {
                AskResponse::Running { trials } if trials.is_empty() => {
                    tokio::time::sleep(self.poll_interval).await;
                }
                AskResponse::Running { trials } => {
                    let scores = score_trials(dataset, objective, &trials).await?;
                    self.tell(&created.id, &scores).await?;
                    scored += scores.len();
                    log::debug!("optimization {}: {} trials scored", created.id, scored);
                }
                AskResponse::Completed { result } => {
                    log::info!(
                        "Optimization {} completed after {} trials: score {:.4}",
                        created.id,
                        scored,
                        result.score
                    );
                    return Ok(result);
                }
                AskResponse::Failed { error } => {
                    return Err(OptimizerError::Failed(
                        error.unwrap_or_else(|| format!("run {} failed", created.id)),
                    ));
                }
            }
        }
    }
}
