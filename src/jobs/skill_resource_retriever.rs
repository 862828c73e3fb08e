//! `skill-resource-retriever`: finds learning resources for a goal.
//!
//! The system prompt has no placeholders. The user message is the user
//! profile and goal as JSON rather than a rendered template.

use serde::Serialize;

use super::{JobError, JobPrompts, OptimizationJob};
use crate::dataset::{to_spaced_json, DatasetItem, MissingFieldError};
use crate::optimizer::ChatPrompt;
use crate::scoring::ContextBuilder;
use crate::template::join_list;

const OUTPUT_FORMAT: &str = "Output format: Array of learning resources with: title, description, provider, resourceType, learningObjectives, sections";

#[derive(Debug, Clone, Copy, Default)]
pub struct SkillResourceRetriever;

impl SkillResourceRetriever {
    pub const NAME: &'static str = "skill-resource-retriever";
    pub const SYSTEM_PROMPT: &'static str = "skill-resource-retriever-agent:system-prompt";
    pub const DATASET: &'static str = "skill-resource-retriever-evaluation";
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UserMessageUser<'a> {
    role: &'a str,
    skills: &'a [String],
    career_goals: &'a [String],
}

#[derive(Debug, Serialize)]
struct UserMessageGoal<'a> {
    name: &'a str,
    reasoning: &'a str,
}

#[derive(Debug, Serialize)]
struct UserMessage<'a> {
    user: UserMessageUser<'a>,
    goal: UserMessageGoal<'a>,
}

/// `{"user": {"role", "skills", "careerGoals"}, "goal": {"name", "reasoning"}}`
pub fn user_message(item: &DatasetItem) -> Result<String, JobError> {
    let user = item.input.user()?;
    let goal = item.input.goal()?;
    let message = UserMessage {
        user: UserMessageUser {
            role: user.role()?,
            skills: user.skills()?,
            career_goals: user.career_goals()?,
        },
        goal: UserMessageGoal {
            name: goal.name()?,
            reasoning: goal.reasoning()?,
        },
    };
    Ok(to_spaced_json(&message)?)
}

/// Relevance context. The expected block is optional here: a missing
/// minimum count reads `N/A` and missing providers read as an empty list.
pub fn scoring_context(item: &DatasetItem) -> Result<Vec<String>, MissingFieldError> {
    let user = item.input.user()?;
    let goal = item.input.goal()?;
    let expected = item.expected.as_ref();

    let min_resources = expected
        .and_then(|e| e.min_resource_count)
        .map(|count| count.to_string())
        .unwrap_or_else(|| "N/A".to_string());
    let providers = expected
        .and_then(|e| e.expected_providers.as_deref())
        .unwrap_or(&[]);

    Ok(vec![
        format!("User role: {}", user.role()?),
        format!("User current skills: {}", join_list(user.skills()?)),
        format!("User career goals: {}", join_list(user.career_goals()?)),
        format!("Goal: {}", goal.name()?),
        format!("Goal reasoning: {}", goal.reasoning()?),
        format!("Expected minimum resources: {}", min_resources),
        format!("Expected providers: {}", join_list(providers)),
        OUTPUT_FORMAT.to_string(),
    ])
}

impl OptimizationJob for SkillResourceRetriever {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn system_prompt_name(&self) -> &'static str {
        Self::SYSTEM_PROMPT
    }

    fn user_prompt_name(&self) -> Option<&'static str> {
        None
    }

    fn dataset_name(&self) -> &'static str {
        Self::DATASET
    }

    fn build_prompt(&self, item: &DatasetItem, prompts: &JobPrompts) -> Result<ChatPrompt, JobError> {
        Ok(ChatPrompt::new(prompts.static_system()?, user_message(item)?))
    }

    fn scoring_context(&self) -> ContextBuilder {
        scoring_context
    }
}
