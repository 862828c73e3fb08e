//! Optimization jobs.
//!
//! A job pairs stored prompts with an evaluation dataset and knows how to turn
//! one dataset item into a concrete [`ChatPrompt`] and a scoring context. The
//! [`OptimizerDriver`] runs any job the same way; the three jobs differ only
//! in what they read from each item.

pub mod challenge_generator;
pub mod driver;
pub mod error;
pub mod skill_resource_retriever;
pub mod user_skill_agent;

use std::fmt;

use clap::ValueEnum;

use crate::dataset::DatasetItem;
use crate::objective::WeightedObjective;
use crate::optimizer::ChatPrompt;
use crate::scoring::{ContextBuilder, Objective};
use crate::template::{PromptTemplate, PromptVariables};

pub use challenge_generator::ChallengeGenerator;
pub use driver::{JobContext, OptimizerDriver};
pub use error::JobError;
pub use skill_resource_retriever::SkillResourceRetriever;
pub use user_skill_agent::UserSkillAgent;

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

/// Templates loaded for a job, plus the system text when the job renders it
/// once up front.
#[derive(Debug, Clone)]
pub struct JobPrompts {
    pub job: String,
    pub system: PromptTemplate,
    pub user: Option<PromptTemplate>,
    pub system_text: Option<String>,
}

impl JobPrompts {
    pub fn new(job: &str, system: PromptTemplate, user: Option<PromptTemplate>) -> Self {
        Self {
            job: job.to_string(),
            system,
            user,
            system_text: None,
        }
    }

    /// Render the system template with no variables and keep the text.
    pub fn render_system_once(mut self) -> Result<Self, JobError> {
        let text = self.system.format(&PromptVariables::new())?;
        self.system_text = Some(text);
        Ok(self)
    }

    /// The pre-rendered system text, rendering it now if needed.
    pub fn static_system(&self) -> Result<String, JobError> {
        match self.system_text {
            Some(ref text) => Ok(text.clone()),
            None => Ok(self.system.format(&PromptVariables::new())?),
        }
    }

    pub fn user(&self) -> Result<&PromptTemplate, JobError> {
        self.user.as_ref().ok_or_else(|| JobError::MissingTemplate {
            job: self.job.clone(),
            role: "user",
        })
    }
}

// ---------------------------------------------------------------------------
// Job trait
// ---------------------------------------------------------------------------

/// One optimization job.
pub trait OptimizationJob: Send + Sync {
    /// Job name as used on the command line.
    fn name(&self) -> &'static str;

    fn system_prompt_name(&self) -> &'static str;

    /// Registry name of the user prompt template, if the job uses one.
    fn user_prompt_name(&self) -> Option<&'static str>;

    fn dataset_name(&self) -> &'static str;

    /// Optimize only the first `n` items.
    fn item_limit(&self) -> Option<usize> {
        None
    }

    /// Whether the system prompt has no per-item placeholders and is rendered
    /// once for the whole job.
    fn renders_system_once(&self) -> bool {
        true
    }

    /// Assemble the chat prompt for one item.
    fn build_prompt(&self, item: &DatasetItem, prompts: &JobPrompts) -> Result<ChatPrompt, JobError>;

    /// Context builder for the relevance judge.
    fn scoring_context(&self) -> ContextBuilder;

    /// Objective to optimize, given the job's relevance scorer.
    fn objective(&self, relevance: Objective) -> Objective {
        std::sync::Arc::new(WeightedObjective::relevance_cost_duration(relevance))
    }
}

// ---------------------------------------------------------------------------
// Job selection
// ---------------------------------------------------------------------------

/// The jobs this tool knows, in run-all order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum JobKind {
    UserSkillAgent,
    SkillResourceRetriever,
    ChallengeGenerator,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [
        JobKind::UserSkillAgent,
        JobKind::SkillResourceRetriever,
        JobKind::ChallengeGenerator,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::UserSkillAgent => UserSkillAgent::NAME,
            JobKind::SkillResourceRetriever => SkillResourceRetriever::NAME,
            JobKind::ChallengeGenerator => ChallengeGenerator::NAME,
        }
    }

    pub fn job(&self) -> Box<dyn OptimizationJob> {
        match self {
            JobKind::UserSkillAgent => Box::new(UserSkillAgent),
            JobKind::SkillResourceRetriever => Box::new(SkillResourceRetriever),
            JobKind::ChallengeGenerator => Box::new(ChallengeGenerator),
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
