//! Typed evaluation dataset records.
//!
//! Registry datasets are free-form JSON. Items are decoded into the record
//! schema below when the dataset is loaded, so a value of the wrong JSON type
//! fails the load. Every field is optional at the type level; a job that
//! needs a field asks for it through an accessor, which reports absence as a
//! [`MissingFieldError`] naming the field and its dotted path.
//!
//! Keys the schema does not know about are kept in `extra` maps. The judge
//! sees the `input` object exactly as loaded (key order and explicit nulls
//! included), not the typed view.

use std::io;

use serde::{Deserialize, Serialize};
use serde_json::ser::Formatter;
use serde_json::{Map, Value};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A dataset item lacks a field a job requires.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("dataset item is missing required field `{field}` ({path})")]
pub struct MissingFieldError {
    /// Field name, e.g. `role`.
    pub field: String,
    /// Dotted path from the item root, e.g. `input.user.role`.
    pub path: String,
}

impl MissingFieldError {
    /// Build the error from a dotted path; the field is its last segment.
    pub fn at(path: &str) -> Self {
        let field = path.rsplit('.').next().unwrap_or(path);
        Self {
            field: field.to_string(),
            path: path.to_string(),
        }
    }
}

/// A dataset record could not be decoded into the item schema.
#[derive(Debug, Error)]
#[error("dataset `{dataset}` item #{index} does not match the item schema: {source}")]
pub struct DatasetError {
    pub dataset: String,
    pub index: usize,
    #[source]
    pub source: serde_json::Error,
}

/// Writes `, ` and `: ` separators and escapes non-ASCII characters.
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
    ) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        for ch in fragment.chars() {
            if ch.is_ascii() {
                writer.write_all(&[ch as u8])?;
            } else {
                let mut units = [0u16; 2];
                for unit in ch.encode_utf16(&mut units).iter() {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

/// Serialize `value` as single-line JSON with `, ` / `: ` separators and
/// ASCII-only output. Prompt messages and judge inputs use this layout.
pub fn to_spaced_json<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let mut buf = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
    value.serialize(&mut serializer)?;
    String::from_utf8(buf).map_err(<serde_json::Error as serde::ser::Error>::custom)
}

fn require<'a, T: ?Sized>(value: Option<&'a T>, path: &str) -> Result<&'a T, MissingFieldError> {
    value.ok_or_else(|| MissingFieldError::at(path))
}

// ---------------------------------------------------------------------------
// Input records
// ---------------------------------------------------------------------------

/// The learner the agent is working for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skills: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub career_goals: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UserProfile {
    pub fn role(&self) -> Result<&str, MissingFieldError> {
        require(self.role.as_deref(), "input.user.role")
    }

    pub fn skills(&self) -> Result<&[String], MissingFieldError> {
        require(self.skills.as_deref(), "input.user.skills")
    }

    pub fn career_goals(&self) -> Result<&[String], MissingFieldError> {
        require(self.career_goals.as_deref(), "input.user.careerGoals")
    }
}

/// A learning goal chosen for the user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Goal {
    pub fn name(&self) -> Result<&str, MissingFieldError> {
        require(self.name.as_deref(), "input.goal.name")
    }

    pub fn reasoning(&self) -> Result<&str, MissingFieldError> {
        require(self.reasoning.as_deref(), "input.goal.reasoning")
    }
}

/// A learning resource (course, book, video) attached to a goal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learning_objectives: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Resource {
    pub fn title(&self) -> Result<&str, MissingFieldError> {
        require(self.title.as_deref(), "input.resource.title")
    }

    pub fn provider(&self) -> Result<&str, MissingFieldError> {
        require(self.provider.as_deref(), "input.resource.provider")
    }

    pub fn resource_type(&self) -> Result<&str, MissingFieldError> {
        require(self.resource_type.as_deref(), "input.resource.resourceType")
    }

    pub fn description(&self) -> Result<&str, MissingFieldError> {
        require(self.description.as_deref(), "input.resource.description")
    }
}

/// Parameters of a quiz section to generate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_questions: Option<u32>,
    /// Nullable in the source data; treated as empty when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_topics: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Challenge {
    pub fn section_title(&self) -> Result<&str, MissingFieldError> {
        require(self.section_title.as_deref(), "input.challenge.sectionTitle")
    }

    pub fn difficulty(&self) -> Result<&str, MissingFieldError> {
        require(self.difficulty.as_deref(), "input.challenge.difficulty")
    }

    pub fn total_questions(&self) -> Result<u32, MissingFieldError> {
        self.total_questions
            .ok_or_else(|| MissingFieldError::at("input.challenge.totalQuestions"))
    }

    /// Section topics, empty when absent or null.
    pub fn section_topics(&self) -> &[String] {
        self.section_topics.as_deref().unwrap_or(&[])
    }
}

/// The `input` structure of a dataset item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<Goal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<Resource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge: Option<Challenge>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ItemInput {
    pub fn user(&self) -> Result<&UserProfile, MissingFieldError> {
        require(self.user.as_ref(), "input.user")
    }

    pub fn goal(&self) -> Result<&Goal, MissingFieldError> {
        require(self.goal.as_ref(), "input.goal")
    }

    pub fn resource(&self) -> Result<&Resource, MissingFieldError> {
        require(self.resource.as_ref(), "input.resource")
    }

    pub fn challenge(&self) -> Result<&Challenge, MissingFieldError> {
        require(self.challenge.as_ref(), "input.challenge")
    }
}

// ---------------------------------------------------------------------------
// Expected output hints
// ---------------------------------------------------------------------------

/// Ground-truth hints attached to an item for the judge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpectedOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excluded_skills: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_resource_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_providers: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ExpectedOutput {
    pub fn skill_count(&self) -> Result<u32, MissingFieldError> {
        self.skill_count
            .ok_or_else(|| MissingFieldError::at("expected.skillCount"))
    }

    pub fn excluded_skills(&self) -> Result<&[String], MissingFieldError> {
        require(self.excluded_skills.as_deref(), "expected.excludedSkills")
    }
}

// ---------------------------------------------------------------------------
// Items and datasets
// ---------------------------------------------------------------------------

/// One evaluation case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetItem {
    /// Registry-assigned identifier, when the item came from the registry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub input: ItemInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<ExpectedOutput>,
    /// `input` as it appeared in the record.
    #[serde(skip)]
    raw_input: Option<Value>,
}

impl DatasetItem {
    /// Decode one registry record.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let raw_input = value.get("input").cloned();
        let mut item: Self = serde_json::from_value(value)?;
        item.raw_input = raw_input;
        Ok(item)
    }

    pub fn expected(&self) -> Result<&ExpectedOutput, MissingFieldError> {
        require(self.expected.as_ref(), "expected")
    }

    /// Name shown in progress output; falls back to the id.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.id.as_deref())
            .unwrap_or("<unnamed item>")
    }

    /// The `input` object serialized as JSON, as handed to the judge. Items
    /// built in code fall back to the typed view.
    pub fn input_json(&self) -> Result<String, serde_json::Error> {
        match self.raw_input {
            Some(ref raw) => to_spaced_json(raw),
            None => to_spaced_json(&self.input),
        }
    }
}

/// An ordered collection of dataset items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Registry identifier, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub items: Vec<DatasetItem>,
}

impl Dataset {
    /// Create a dataset from already decoded items.
    pub fn new(name: impl Into<String>, items: Vec<DatasetItem>) -> Self {
        Self {
            id: None,
            name: name.into(),
            items,
        }
    }

    /// Decode raw registry records, failing on the first record that does
    /// not match the item schema.
    pub fn from_records(name: &str, records: Vec<Value>) -> Result<Self, DatasetError> {
        let items = records
            .into_iter()
            .enumerate()
            .map(|(index, record)| {
                DatasetItem::from_value(record).map_err(|source| DatasetError {
                    dataset: name.to_string(),
                    index,
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(name, items))
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn items(&self) -> &[DatasetItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Stable key for the item at `index`: its id, or its position.
    pub fn item_key(&self, index: usize) -> Option<String> {
        self.items
            .get(index)
            .map(|item| item.id.clone().unwrap_or_else(|| index.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_record() -> Value {
        json!({
            "name": "backend-engineer",
            "input": {
                "user": {
                    "role": "Backend Engineer",
                    "skills": ["Python", "SQL"],
                    "careerGoals": ["Staff Engineer"],
                    "yearsOfExperience": 4
                },
                "goal": {"name": "Distributed systems", "reasoning": "Scale services"}
            },
            "expected": {"skillCount": 5, "excludedSkills": ["Python"]}
        })
    }

    #[test]
    fn test_decode_typed_item() {
        let item = DatasetItem::from_value(sample_record()).unwrap();
        let user = item.input.user().unwrap();
        assert_eq!(user.role().unwrap(), "Backend Engineer");
        assert_eq!(user.skills().unwrap(), ["Python", "SQL"]);
        assert_eq!(item.expected().unwrap().skill_count().unwrap(), 5);
        assert_eq!(item.display_name(), "backend-engineer");
    }

    #[test]
    fn test_missing_role_names_field_and_path() {
        let mut record = sample_record();
        record["input"]["user"]
            .as_object_mut()
            .unwrap()
            .remove("role");
        let item = DatasetItem::from_value(record).unwrap();
        let err = item.input.user().unwrap().role().unwrap_err();
        assert_eq!(err.field, "role");
        assert_eq!(err.path, "input.user.role");
        assert!(err.to_string().contains("`role`"));
    }

    #[test]
    fn test_missing_nested_struct() {
        let item = DatasetItem::from_value(json!({"input": {}})).unwrap();
        let err = item.input.challenge().unwrap_err();
        assert_eq!(err.field, "challenge");
        assert_eq!(item.expected().unwrap_err().path, "expected");
    }

    #[test]
    fn test_unknown_keys_survive_serialization() {
        let item = DatasetItem::from_value(sample_record()).unwrap();
        let json = item.input_json().unwrap();
        assert!(json.contains("\"yearsOfExperience\": 4"));
        assert!(json.contains("\"careerGoals\": [\"Staff Engineer\"]"));
    }

    #[test]
    fn test_input_json_keeps_nulls_and_key_order() {
        let item = DatasetItem::from_value(json!({
            "input": {
                "challenge": {"sectionTitle": "Intro", "zeta": 1, "sectionTopics": null, "alpha": 2}
            }
        }))
        .unwrap();
        assert_eq!(
            item.input_json().unwrap(),
            r#"{"challenge": {"sectionTitle": "Intro", "zeta": 1, "sectionTopics": null, "alpha": 2}}"#
        );
    }

    #[test]
    fn test_spaced_json_escapes_non_ascii() {
        let json = to_spaced_json(&json!({"role": "Ingénieur", "tags": ["a", "b"]})).unwrap();
        assert_eq!(json, r#"{"role": "Ing\u00e9nieur", "tags": ["a", "b"]}"#);
    }

    #[test]
    fn test_null_section_topics_read_as_empty() {
        let item = DatasetItem::from_value(json!({
            "input": {"challenge": {"sectionTitle": "Intro", "sectionTopics": null}}
        }))
        .unwrap();
        assert!(item.input.challenge().unwrap().section_topics().is_empty());
    }

    #[test]
    fn test_from_records_reports_bad_index() {
        let records = vec![
            sample_record(),
            json!({"input": {"user": {"skills": "not-a-list"}}}),
        ];
        let err = Dataset::from_records("user-skill-agent-evaluation", records).unwrap_err();
        assert_eq!(err.index, 1);
        assert_eq!(err.dataset, "user-skill-agent-evaluation");
    }

    #[test]
    fn test_item_key_falls_back_to_position() {
        let mut dataset = Dataset::new("ds", vec![DatasetItem::default(), DatasetItem::default()]);
        dataset.items[0].id = Some("item-a".to_string());
        assert_eq!(dataset.item_key(0).as_deref(), Some("item-a"));
        assert_eq!(dataset.item_key(1).as_deref(), Some("1"));
        assert_eq!(dataset.item_key(2), None);
    }
}
