//! Prompt templates and placeholder rendering.
//!
//! Registry prompts are mustache-style by default: placeholders look like
//! `{{userRole}}`, with optional whitespace inside the braces. Rendering is a
//! single pass over the template, so a substituted value that itself contains
//! `{{...}}` is never expanded again. `jinja2` prompts are handed to `tera`.

use std::collections::HashMap;
use std::fmt::Display;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use thiserror::Error;

static MUSTACHE_VARIABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_\-]*)\s*\}\}").unwrap());

/// Separator used when a list-valued field fills a placeholder.
pub const LIST_SEPARATOR: &str = ", ";

/// Join list values the way every prompt and scoring context expects them.
pub fn join_list(values: &[String]) -> String {
    values.join(LIST_SEPARATOR)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Rendering a template failed; no text is produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateRenderError {
    /// The template declares a placeholder the variables do not supply.
    #[error("template `{template}` references placeholder `{placeholder}` with no value")]
    MissingPlaceholder {
        template: String,
        placeholder: String,
    },

    /// A list-valued placeholder was given an absent list to join.
    #[error("placeholder `{placeholder}` requires a list value but none was provided")]
    NullValue { placeholder: String },

    /// The template engine rejected the template or its variables.
    #[error("template `{template}` failed to render: {message}")]
    Engine { template: String, message: String },
}

// ---------------------------------------------------------------------------
// Variables
// ---------------------------------------------------------------------------

/// Mapping of placeholder name to its string value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptVariables {
    values: HashMap<String, String>,
}

impl PromptVariables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a placeholder from any displayable value.
    pub fn text(mut self, name: &str, value: impl Display) -> Self {
        self.values.insert(name.to_string(), value.to_string());
        self
    }

    /// Set a placeholder from a list, joined with `", "`.
    ///
    /// # Errors
    /// [`TemplateRenderError::NullValue`] when `values` is `None`.
    pub fn list(self, name: &str, values: Option<&[String]>) -> Result<Self, TemplateRenderError> {
        match values {
            Some(values) => Ok(self.text(name, join_list(values))),
            None => Err(TemplateRenderError::NullValue {
                placeholder: name.to_string(),
            }),
        }
    }

    /// Like [`list`](Self::list), but an absent list renders as empty text.
    pub fn list_or_empty(self, name: &str, values: Option<&[String]>) -> Self {
        self.text(name, join_list(values.unwrap_or(&[])))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

// ---------------------------------------------------------------------------
// Templates
// ---------------------------------------------------------------------------

/// Placeholder syntax of a stored prompt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateType {
    #[default]
    Mustache,
    Jinja2,
}

impl TemplateType {
    /// Interpret the registry's `type` field; anything unrecognised is mustache.
    pub fn from_registry(value: Option<&str>) -> Self {
        match value.map(str::to_ascii_lowercase).as_deref() {
            Some("jinja2") => Self::Jinja2,
            _ => Self::Mustache,
        }
    }
}

/// A named, versioned prompt text with placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub name: String,
    /// Registry commit of this version, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    pub template: String,
    #[serde(default)]
    pub template_type: TemplateType,
}

impl PromptTemplate {
    /// Create a mustache template.
    pub fn new(name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            commit: None,
            template: template.into(),
            template_type: TemplateType::Mustache,
        }
    }

    pub fn with_type(mut self, template_type: TemplateType) -> Self {
        self.template_type = template_type;
        self
    }

    pub fn with_commit(mut self, commit: impl Into<String>) -> Self {
        self.commit = Some(commit.into());
        self
    }

    /// Placeholder names in order of first appearance, without duplicates.
    pub fn placeholders(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for cap in MUSTACHE_VARIABLE.captures_iter(&self.template) {
            let name = &cap[1];
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        names
    }

    /// Render the template with `vars`.
    ///
    /// # Errors
    /// Fails if a declared placeholder has no value, or if the template
    /// engine rejects a `jinja2` template.
    pub fn format(&self, vars: &PromptVariables) -> Result<String, TemplateRenderError> {
        match self.template_type {
            TemplateType::Mustache => self.render_mustache(vars),
            TemplateType::Jinja2 => self.render_jinja(vars),
        }
    }

    fn render_mustache(&self, vars: &PromptVariables) -> Result<String, TemplateRenderError> {
        let placeholders = self.placeholders();
        if let Some(missing) = placeholders.iter().find(|p| !vars.contains(p)) {
            return Err(TemplateRenderError::MissingPlaceholder {
                template: self.name.clone(),
                placeholder: missing.clone(),
            });
        }

        let unused: Vec<&str> = vars
            .iter()
            .map(|(name, _)| name)
            .filter(|name| !placeholders.iter().any(|p| p.as_str() == *name))
            .collect();
        if !unused.is_empty() {
            log::debug!(
                "template `{}` ignores variables: {}",
                self.name,
                unused.join(", ")
            );
        }

        let rendered = MUSTACHE_VARIABLE.replace_all(&self.template, |caps: &Captures| {
            vars.get(&caps[1]).unwrap_or_default().to_string()
        });
        Ok(rendered.into_owned())
    }

    fn render_jinja(&self, vars: &PromptVariables) -> Result<String, TemplateRenderError> {
        let mut context = tera::Context::new();
        for (name, value) in vars.iter() {
            context.insert(name, value);
        }
        tera::Tera::one_off(&self.template, &context, false).map_err(|e| {
            TemplateRenderError::Engine {
                template: self.name.clone(),
                message: error_chain(&e),
            }
        })
    }
}

/// Flatten an error and its sources into one line.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
