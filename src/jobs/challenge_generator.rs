//! `challenge-generator`: writes quiz questions for one resource section.
//!
//! Only the first dataset item is optimized, against relevance alone. Both
//! prompts depend on the item, so the system prompt is rendered per item.

use std::fmt;
use std::str::FromStr;

use super::{JobError, JobPrompts, OptimizationJob};
use crate::dataset::{DatasetItem, MissingFieldError};
use crate::optimizer::ChatPrompt;
use crate::scoring::{ContextBuilder, Objective};
use crate::template::{join_list, PromptVariables};

const OUTPUT_FORMAT: &str = "Output format: Array of question objects with fields: questionNumber, question, options (A/B/C/D), correctAnswer, explanation, hint";

/// Question difficulty of a challenge section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    /// Text substituted for `difficultyDescription`.
    pub fn description(&self) -> &'static str {
        match self {
            Difficulty::Easy => {
                "beginner-friendly questions that test basic recall and understanding"
            }
            Difficulty::Medium => {
                "intermediate questions that require applying knowledge to scenarios"
            }
            Difficulty::Hard => {
                "advanced questions that require deep understanding and critical thinking"
            }
        }
    }
}

impl FromStr for Difficulty {
    type Err = ();

    /// Exact, lowercase match.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChallengeGenerator;

impl ChallengeGenerator {
    pub const NAME: &'static str = "challenge-generator";
    pub const SYSTEM_PROMPT: &'static str = "challenge-generator-agent:system-prompt";
    pub const USER_PROMPT: &'static str = "challenge-generator-agent:user-prompt";
    pub const DATASET: &'static str = "challenge-generator-evaluation";
}

fn difficulty(item: &DatasetItem) -> Result<(String, Difficulty), JobError> {
    let raw = item.input.challenge()?.difficulty()?;
    let parsed = raw.parse::<Difficulty>().map_err(|_| JobError::UnknownDifficulty {
        item: item.display_name().to_string(),
        difficulty: raw.to_string(),
    })?;
    Ok((raw.to_string(), parsed))
}

pub fn system_variables(item: &DatasetItem) -> Result<PromptVariables, JobError> {
    let challenge = item.input.challenge()?;
    let (raw, difficulty) = difficulty(item)?;
    Ok(PromptVariables::new()
        .text("questionsPerChallenge", challenge.total_questions()?)
        .text("difficultyDescription", difficulty.description())
        .text("sectionTitle", challenge.section_title()?)
        .text("difficultyUpper", raw.to_uppercase()))
}

pub fn user_variables(item: &DatasetItem) -> Result<PromptVariables, JobError> {
    let input = &item.input;
    let user = input.user()?;
    let goal = input.goal()?;
    let resource = input.resource()?;
    let challenge = input.challenge()?;
    let (raw, _) = difficulty(item)?;

    Ok(PromptVariables::new()
        .text("questionsPerChallenge", challenge.total_questions()?)
        .text("difficulty", raw)
        .text("userRole", user.role()?)
        .list("userSkills", user.skills.as_deref())?
        .list("userCareerGoals", user.career_goals.as_deref())?
        .text("goalName", goal.name()?)
        .text("goalReasoning", goal.reasoning()?)
        .text("resourceTitle", resource.title()?)
        .text("resourceProvider", resource.provider()?)
        .text("resourceType", resource.resource_type()?)
        .text("resourceDescription", resource.description()?)
        .list("learningObjectives", resource.learning_objectives.as_deref())?
        .text("sectionTitle", challenge.section_title()?)
        .list_or_empty("sectionTopics", challenge.section_topics.as_deref()))
}

/// Relevance context for a challenge item.
pub fn scoring_context(item: &DatasetItem) -> Result<Vec<String>, MissingFieldError> {
    let input = &item.input;
    let user = input.user()?;
    let goal = input.goal()?;
    let resource = input.resource()?;
    let challenge = input.challenge()?;

    Ok(vec![
        format!("User role: {}", user.role()?),
        format!("User skills: {}", join_list(user.skills()?)),
        format!("User career goals: {}", join_list(user.career_goals()?)),
        format!("Learning goal: {}", goal.name()?),
        format!("Goal reasoning: {}", goal.reasoning()?),
        format!("Resource: {}", resource.title()?),
        format!("Resource provider: {}", resource.provider()?),
        format!("Section: {}", challenge.section_title()?),
        format!("Difficulty: {}", challenge.difficulty()?),
        format!("Expected question count: {}", challenge.total_questions()?),
        format!("Topics: {}", join_list(challenge.section_topics())),
        OUTPUT_FORMAT.to_string(),
    ])
}

impl OptimizationJob for ChallengeGenerator {
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

    fn item_limit(&self) -> Option<usize> {
        Some(1)
    }

    fn renders_system_once(&self) -> bool {
        false
    }

    fn build_prompt(&self, item: &DatasetItem, prompts: &JobPrompts) -> Result<ChatPrompt, JobError> {
        let system = prompts.system.format(&system_variables(item)?)?;
        let user = prompts.user()?.format(&user_variables(item)?)?;
        Ok(ChatPrompt::new(system, user))
    }

    fn scoring_context(&self) -> ContextBuilder {
        scoring_context
    }

    fn objective(&self, relevance: Objective) -> Objective {
        relevance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::PromptTemplate;
    use serde_json::json;

    fn item(difficulty: &str) -> DatasetItem {
        DatasetItem::from_value(json!({
            "name": "sql-joins-quiz",
            "input": {
                "user": {
                    "role": "Data Analyst",
                    "skills": ["Excel"],
                    "careerGoals": ["Analytics Engineer"]
                },
                "goal": {"name": "SQL", "reasoning": "Query warehouses directly"},
                "resource": {
                    "title": "SQL for Analysts",
                    "provider": "Coursera",
                    "resourceType": "course",
                    "description": "Hands-on SQL",
                    "learningObjectives": ["Joins", "Aggregations"]
                },
                "challenge": {
                    "sectionTitle": "Joins",
                    "difficulty": difficulty,
                    "totalQuestions": 5,
                    "sectionTopics": null
                }
            }
        }))
        .unwrap()
    }

    fn prompts() -> JobPrompts {
        JobPrompts::new(
            ChallengeGenerator::NAME,
            PromptTemplate::new(
                ChallengeGenerator::SYSTEM_PROMPT,
                "Write {{questionsPerChallenge}} {{difficultyUpper}} questions on {{sectionTitle}}: {{difficultyDescription}}.",
            ),
            Some(PromptTemplate::new(
                ChallengeGenerator::USER_PROMPT,
                "{{userRole}} learning {{goalName}} from {{resourceTitle}} ({{learningObjectives}}). Topics: [{{sectionTopics}}] Level: {{difficulty}}",
            )),
        )
    }

    #[test]
    fn test_difficulty_parsing() {
        assert_eq!("medium".parse::<Difficulty>(), Ok(Difficulty::Medium));
        assert!("Medium".parse::<Difficulty>().is_err());
        assert!(Difficulty::Hard.description().starts_with("advanced"));
    }

    #[test]
    fn test_build_prompt() {
        let prompt = ChallengeGenerator.build_prompt(&item("easy"), &prompts()).unwrap();
        assert_eq!(
            prompt.system,
            "Write 5 EASY questions on Joins: beginner-friendly questions that test basic recall and understanding."
        );
        assert_eq!(
            prompt.user,
            "Data Analyst learning SQL from SQL for Analysts (Joins, Aggregations). Topics: [] Level: easy"
        );
    }

    #[test]
    fn test_unknown_difficulty() {
        let err = ChallengeGenerator
            .build_prompt(&item("expert"), &prompts())
            .unwrap_err();
        match err {
            JobError::UnknownDifficulty { item, difficulty } => {
                assert_eq!(item, "sql-joins-quiz");
                assert_eq!(difficulty, "expert");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_scoring_context_lines() {
        let context = scoring_context(&item("hard")).unwrap();
        assert_eq!(context[1], "User skills: Excel");
        assert_eq!(context[3], "Learning goal: SQL");
        assert_eq!(context[8], "Difficulty: hard");
        assert_eq!(context[9], "Expected question count: 5");
        assert_eq!(context[10], "Topics: ");
        assert_eq!(context.len(), 12);
    }

    #[test]
    fn test_first_item_rendered_per_item() {
        assert_eq!(ChallengeGenerator.item_limit(), Some(1));
        assert!(!ChallengeGenerator.renders_system_once());
    }
}
