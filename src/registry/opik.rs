//! Opik REST registry client.
//!
//! Endpoints used:
//! - `POST /v1/private/prompts/versions/retrieve` latest prompt version by name
//! - `POST /v1/private/datasets/retrieve` dataset metadata by name
//! - `GET /v1/private/datasets/{id}/items` paged dataset items
//!
//! Requests carry the API key in `authorization` and the workspace in
//! `Comet-Workspace` when they are configured (self-hosted instances need
//! neither).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{PromptRegistry, RegistryError};
use crate::config::RegistrySettings;
use crate::dataset::Dataset;
use crate::template::{PromptTemplate, TemplateType};

/// Items requested per page when listing a dataset.
pub const DEFAULT_PAGE_SIZE: usize = 100;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PromptVersionResponse {
    template: String,
    #[serde(default)]
    commit: Option<String>,
    #[serde(default, rename = "type")]
    template_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DatasetResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct DatasetItemsPage {
    #[serde(default)]
    content: Vec<DatasetItemRecord>,
    #[serde(default)]
    total: Option<usize>,
}

/// One stored dataset item. Current servers put the user payload in `data`;
/// older ones split it into `input` / `expected_output`.
#[derive(Debug, Default, Deserialize)]
struct DatasetItemRecord {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    data: Option<Map<String, Value>>,
    #[serde(default)]
    input: Option<Value>,
    #[serde(default)]
    expected_output: Option<Value>,
}

impl DatasetItemRecord {
    /// Flatten into the record shape [`Dataset::from_records`] decodes.
    fn into_record(self) -> Value {
        let mut record = match self.data {
            Some(data) => data,
            None => {
                let mut legacy = Map::new();
                if let Some(input) = self.input {
                    legacy.insert("input".to_string(), input);
                }
                if let Some(expected) = self.expected_output {
                    legacy.insert("expected".to_string(), expected);
                }
                legacy
            }
        };
        if let Some(id) = self.id {
            record.entry("id").or_insert(Value::String(id));
        }
        Value::Object(record)
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// [`PromptRegistry`] backed by an Opik server.
#[derive(Debug, Clone)]
pub struct OpikRegistry {
    base_url: String,
    api_key: Option<String>,
    workspace: Option<String>,
    page_size: usize,
    client: reqwest::Client,
}

impl OpikRegistry {
    /// Build a client from registry settings.
    pub fn from_settings(
        settings: &RegistrySettings,
        timeout: Duration,
    ) -> Result<Self, RegistryError> {
        if settings.base_url.trim().is_empty() {
            return Err(RegistryError::InvalidConfig(
                "registry base_url is empty".to_string(),
            ));
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            workspace: settings.workspace.clone(),
            page_size: DEFAULT_PAGE_SIZE,
            client,
        })
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.request(method, url);
        if let Some(ref key) = self.api_key {
            request = request.header("authorization", key);
        }
        if let Some(ref workspace) = self.workspace {
            request = request.header("Comet-Workspace", workspace);
        }
        request
    }

    /// Send a request and decode the JSON body. `404` becomes `Ok(None)`.
    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<Option<T>, RegistryError> {
        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = response.text().await?;
        if !status.is_success() {
            return Err(RegistryError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(Some(serde_json::from_str(&body)?))
    }

    /// Page through the items of `dataset_id` until the listing is exhausted.
    async fn fetch_items(&self, name: &str, dataset_id: &str) -> Result<Vec<Value>, RegistryError> {
        let mut records = Vec::new();
        let mut page = 1usize;

        loop {
            let request = self
                .request(Method::GET, &format!("/v1/private/datasets/{}/items", dataset_id))
                .query(&[("page", page), ("size", self.page_size)]);
            let batch: DatasetItemsPage = self
                .send_json(request)
                .await?
                .ok_or_else(|| RegistryError::DatasetNotFound(name.to_string()))?;

            let received = batch.content.len();
            records.extend(batch.content.into_iter().map(DatasetItemRecord::into_record));
            log::debug!(
                "dataset {} page {}: {} items ({} so far)",
                dataset_id,
                page,
                received,
                records.len()
            );

            let exhausted = match batch.total {
                Some(total) => records.len() >= total,
                None => received < self.page_size,
            };
            if received == 0 || exhausted {
                break;
            }
            page += 1;
        }

        Ok(records)
    }
}

#[async_trait]
impl PromptRegistry for OpikRegistry {
    async fn get_prompt(&self, name: &str) -> Result<PromptTemplate, RegistryError> {
        let request = self
            .request(Method::POST, "/v1/private/prompts/versions/retrieve")
            .json(&json!({ "name": name }));
        let version: PromptVersionResponse = self
            .send_json(request)
            .await?
            .ok_or_else(|| RegistryError::PromptNotFound(name.to_string()))?;

        log::info!(
            "Loaded prompt {} (commit {})",
            name,
            version.commit.as_deref().unwrap_or("unknown")
        );

        let mut prompt = PromptTemplate::new(name, version.template)
            .with_type(TemplateType::from_registry(version.template_type.as_deref()));
        prompt.commit = version.commit;
        Ok(prompt)
    }

    async fn get_dataset(&self, name: &str) -> Result<Dataset, RegistryError> {
        let request = self
            .request(Method::POST, "/v1/private/datasets/retrieve")
            .json(&json!({ "dataset_name": name }));
        let meta: DatasetResponse = self
            .send_json(request)
            .await?
            .ok_or_else(|| RegistryError::DatasetNotFound(name.to_string()))?;

        let records = self.fetch_items(name, &meta.id).await?;
        let dataset = Dataset::from_records(name, records)?.with_id(meta.id);
        log::info!("Loaded dataset {} ({} items)", name, dataset.len());
        Ok(dataset)
    }
}
