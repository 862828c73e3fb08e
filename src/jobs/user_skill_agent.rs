//! `user-skill-agent`: recommends skills a user should learn next.

use super::{JobError, JobPrompts, OptimizationJob};
use crate::dataset::{DatasetItem, MissingFieldError};
use crate::optimizer::ChatPrompt;
use crate::scoring::ContextBuilder;
use crate::template::{join_list, PromptVariables};

const OUTPUT_FORMAT: &str = "Output format: JSON Lines — one JSON object per line with exactly these fields: name (string), priority (1-10), reasoning (string)";

#[derive(Debug, Clone, Copy, Default)]
pub struct UserSkillAgent;

impl UserSkillAgent {
    pub const NAME: &'static str = "user-skill-agent";
    pub const SYSTEM_PROMPT: &'static str = "user-skill-agent:system-prompt";
    pub const USER_PROMPT: &'static str = "user-skill-agent:user-prompt";
    pub const DATASET: &'static str = "user-skill-agent-evaluation";
}

/// Variables for the user prompt: `userRole`, `userSkills`, `userCareerGoals`.
pub fn user_variables(item: &DatasetItem) -> Result<PromptVariables, JobError> {
    let user = item.input.user()?;
    Ok(PromptVariables::new()
        .text("userRole", user.role()?)
        .list("userSkills", user.skills.as_deref())?
        .list("userCareerGoals", user.career_goals.as_deref())?)
}

/// Relevance context: the user's profile, the expected skill count and the
/// skills the answer must not repeat.
pub fn scoring_context(item: &DatasetItem) -> Result<Vec<String>, MissingFieldError> {
    let user = item.input.user()?;
    let expected = item.expected()?;
    Ok(vec![
        format!("User role: {}", user.role()?),
        format!("User current skills: {}", join_list(user.skills()?)),
        format!("User career goals: {}", join_list(user.career_goals()?)),
        format!("Expected skill count: {}", expected.skill_count()?),
        format!(
            "Skills to exclude (user already has): {}",
            join_list(expected.excluded_skills()?)
        ),
        OUTPUT_FORMAT.to_string(),
    ])
}

impl OptimizationJob for UserSkillAgent {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn system_prompt_name(&self) -> &'static str {
        Self::SYSTEM_PROMPT
    }

    fn user_prompt_name(&self) -> Option<&'static str> {
        Some(Self::USER_PROMPT)
    }

    fn dataset_name(&self) -> &'static str {
        Self::DATASET
    }

    fn build_prompt(&self, item: &DatasetItem, prompts: &JobPrompts) -> Result<ChatPrompt, JobError> {
        let system = prompts.static_system()?;
        let user = prompts.user()?.format(&user_variables(item)?)?;
        Ok(ChatPrompt::new(system, user))
    }

    fn scoring_context(&self) -> ContextBuilder {
        scoring_context
    }
}
