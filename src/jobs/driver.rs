//! Runs an [`OptimizationJob`] end to end.

use std::sync::Arc;

use super::{JobError, JobPrompts, OptimizationJob};
use crate::config::OptimizeConfig;
use crate::optimizer::{OptimizationResult, OptimizerService, RemoteOptimizer};
use crate::registry::{OpikRegistry, PromptRegistry};
use crate::scoring::{ChatCompletionsJudge, RelevanceJudge, RelevanceScorer};
use crate::utilities::printer::Printer;

/// External services and settings shared by every job in a process.
#[derive(Clone)]
pub struct JobContext {
    pub registry: Arc<dyn PromptRegistry>,
    pub optimizer: Arc<dyn OptimizerService>,
    pub judge: Arc<dyn RelevanceJudge>,
    /// Sample budget handed to the optimizer for each item.
    pub n_samples: usize,
    pub printer: Printer,
}

impl JobContext {
    /// Connect the HTTP adapters described by `config`.
    pub fn from_config(config: &OptimizeConfig) -> Result<Self, JobError> {
        let timeout = config.timeout();
        let registry = OpikRegistry::from_settings(&config.registry, timeout)?;
        let optimizer = RemoteOptimizer::from_settings(&config.optimizer, timeout)?;
        let judge = ChatCompletionsJudge::from_settings(&config.judge, timeout)?;

        log::debug!(
            "registry={}, judge model={}, optimizer model={}",
            registry.base_url(),
            judge.model(),
            optimizer.settings().model
        );

        Ok(Self {
            registry: Arc::new(registry),
            optimizer: Arc::new(optimizer),
            judge: Arc::new(judge),
            n_samples: config.n_samples,
            printer: Printer::new(),
        })
    }
}

/// Drives the per-item optimization loop of a job.
pub struct OptimizerDriver {
    context: JobContext,
}

impl OptimizerDriver {
    pub fn new(context: JobContext) -> Self {
        Self { context }
    }

    /// Load the job's prompts and dataset, then optimize each item in
    /// dataset order. The first error aborts the job.
    pub async fn run_job(
        &self,
        job: &dyn OptimizationJob,
    ) -> Result<Vec<OptimizationResult>, JobError> {
        let ctx = &self.context;
        log::info!("Starting job {}", job.name());

        let system = ctx.registry.get_prompt(job.system_prompt_name()).await?;
        let user = match job.user_prompt_name() {
            Some(name) => Some(ctx.registry.get_prompt(name).await?),
            None => None,
        };
        let dataset = ctx.registry.get_dataset(job.dataset_name()).await?;

        let mut prompts = JobPrompts::new(job.name(), system, user);
        if job.renders_system_once() {
            prompts = prompts.render_system_once()?;
        }

        let relevance = Arc::new(RelevanceScorer::new(
            job.scoring_context(),
            Arc::clone(&ctx.judge),
        ));
        let objective = job.objective(relevance);

        let limit = match job.item_limit() {
            Some(_) if dataset.is_empty() => {
                return Err(JobError::EmptyDataset(dataset.name.clone()));
            }
            Some(limit) => limit,
            None => {
                if dataset.is_empty() {
                    log::warn!("Dataset {} has no items; nothing to optimize", dataset.name);
                }
                dataset.len()
            }
        };

        let mut results = Vec::new();
        for item in dataset.items().iter().take(limit) {
            let prompt = job.build_prompt(item, &prompts)?;

            ctx.printer
                .println(&format!("\nOptimizing for: {}", item.display_name()));
            let result = ctx
                .optimizer
                .optimize_prompt(&prompt, &dataset, objective.as_ref(), ctx.n_samples)
                .await?;
            result.display(&ctx.printer);
            results.push(result);
        }

        log::info!(
            "Job {} finished: {} item(s) optimized",
            job.name(),
            results.len()
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::{json, Map};

    use super::*;
    use crate::dataset::Dataset;
    use crate::jobs::{ChallengeGenerator, SkillResourceRetriever, UserSkillAgent};
    use crate::optimizer::{ChatPrompt, OptimizerError};
    use crate::registry::InMemoryRegistry;
    use crate::scoring::{JudgeVerdict, ScoreError, ScoringFunction, TaskSpan};
    use crate::template::PromptTemplate;

    struct FixedJudge(f64);

    #[async_trait]
    impl RelevanceJudge for FixedJudge {
        async fn judge(
            &self,
            _input: &str,
            _output: &str,
            _context: &[String],
        ) -> Result<JudgeVerdict, ScoreError> {
            Ok(JudgeVerdict {
                value: self.0,
                reason: None,
            })
        }
    }

    /// Records each submission and scores the first item once, the way the
    /// service would for a single trial.
    #[derive(Default)]
    struct RecordingOptimizer {
        calls: Mutex<Vec<(ChatPrompt, String, usize, f64)>>,
    }

    #[async_trait]
    impl OptimizerService for RecordingOptimizer {
        async fn optimize_prompt(
            &self,
            prompt: &ChatPrompt,
            dataset: &Dataset,
            objective: &dyn ScoringFunction,
            n_samples: usize,
        ) -> Result<OptimizationResult, OptimizerError> {
            let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
            let mut span = TaskSpan::new("task", start);
            span.end_time = Some(start + Duration::seconds(1));
            span.total_estimated_cost = Some(0.01);

            let score = objective
                .score(&dataset.items[0], "[]", Some(&span))
                .await
                .map_err(|source| OptimizerError::Scoring {
                    trial_id: "t0".to_string(),
                    source,
                })?;

            self.calls.lock().unwrap().push((
                prompt.clone(),
                objective.name().to_string(),
                n_samples,
                score.value,
            ));

            Ok(OptimizationResult {
                optimizer: "recording".to_string(),
                metric_name: objective.name().to_string(),
                initial_score: None,
                score: score.value,
                prompt: prompt.clone(),
                history: vec![],
                details: Map::new(),
            })
        }
    }

    fn profile(name: &str, role: &str) -> serde_json::Value {
        json!({
            "name": name,
            "input": {
                "user": {"role": role, "skills": ["Python", "SQL"], "careerGoals": ["Data Scientist"]},
                "goal": {"name": "Statistics", "reasoning": "Needed for modelling"},
                "resource": {
                    "title": "Intro to Stats",
                    "provider": "edX",
                    "resourceType": "course",
                    "description": "Probability and inference",
                    "learningObjectives": ["Distributions"]
                },
                "challenge": {"sectionTitle": "Distributions", "difficulty": "medium", "totalQuestions": 3}
            },
            "expected": {"skillCount": 4, "excludedSkills": ["Python"]}
        })
    }

    fn registry() -> InMemoryRegistry {
        let records = vec![profile("analyst", "Data Analyst"), profile("engineer", "Data Engineer")];
        InMemoryRegistry::new()
            .with_prompt(PromptTemplate::new(UserSkillAgent::SYSTEM_PROMPT, "Recommend skills."))
            .with_prompt(PromptTemplate::new(UserSkillAgent::USER_PROMPT, "I am a {{userRole}}."))
            .with_prompt(PromptTemplate::new(SkillResourceRetriever::SYSTEM_PROMPT, "Find resources."))
            .with_prompt(PromptTemplate::new(
                ChallengeGenerator::SYSTEM_PROMPT,
                "{{questionsPerChallenge}} {{difficultyUpper}} questions on {{sectionTitle}}",
            ))
            .with_prompt(PromptTemplate::new(ChallengeGenerator::USER_PROMPT, "Quiz {{userRole}} on {{sectionTitle}}"))
            .with_dataset(Dataset::from_records(UserSkillAgent::DATASET, records.clone()).unwrap())
            .with_dataset(Dataset::from_records(SkillResourceRetriever::DATASET, records.clone()).unwrap())
            .with_dataset(Dataset::from_records(ChallengeGenerator::DATASET, records).unwrap())
    }

    fn driver(registry: InMemoryRegistry, optimizer: Arc<RecordingOptimizer>) -> OptimizerDriver {
        OptimizerDriver::new(JobContext {
            registry: Arc::new(registry),
            optimizer,
            judge: Arc::new(FixedJudge(0.9)),
            n_samples: 10,
            printer: Printer::plain(),
        })
    }

    #[tokio::test]
    async fn test_user_skill_agent_optimizes_every_item() {
        let optimizer = Arc::new(RecordingOptimizer::default());
        let results = driver(registry(), optimizer.clone())
            .run_job(&UserSkillAgent)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        let calls = optimizer.calls.lock().unwrap();
        assert_eq!(calls[0].0.system, "Recommend skills.");
        assert_eq!(calls[0].0.user, "I am a Data Analyst.");
        assert_eq!(calls[1].0.user, "I am a Data Engineer.");
        assert_eq!(calls[0].1, "relevance_cost_duration");
        assert_eq!(calls[0].2, 10);
        // 0.9 - 0.25 * 1.0 cent - 0.25 * 1.0 s
        assert!((calls[0].3 - 0.4).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_retriever_sends_json_user_message() {
        let optimizer = Arc::new(RecordingOptimizer::default());
        driver(registry(), optimizer.clone())
            .run_job(&SkillResourceRetriever)
            .await
            .unwrap();

        let calls = optimizer.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0.system, "Find resources.");
        let message: serde_json::Value = serde_json::from_str(&calls[0].0.user).unwrap();
        assert_eq!(message["goal"]["name"], "Statistics");
    }

    #[tokio::test]
    async fn test_challenge_generator_first_item_relevance_only() {
        let optimizer = Arc::new(RecordingOptimizer::default());
        let results = driver(registry(), optimizer.clone())
            .run_job(&ChallengeGenerator)
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        let calls = optimizer.calls.lock().unwrap();
        assert_eq!(calls[0].0.system, "3 MEDIUM questions on Distributions");
        assert_eq!(calls[0].1, "answer_relevance");
        assert_eq!(calls[0].3, 0.9);
    }

    #[tokio::test]
    async fn test_first_bad_item_aborts_job() {
        let mut broken = profile("broken", "unused");
        broken["input"]["user"].as_object_mut().unwrap().remove("role");
        let registry = registry().with_dataset(
            Dataset::from_records(UserSkillAgent::DATASET, vec![broken, profile("ok", "Analyst")])
                .unwrap(),
        );

        let optimizer = Arc::new(RecordingOptimizer::default());
        let err = driver(registry, optimizer.clone())
            .run_job(&UserSkillAgent)
            .await
            .unwrap_err();

        assert!(matches!(err, JobError::MissingField(ref e) if e.field == "role"));
        assert!(optimizer.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_dataset_fails_first_item_job() {
        let registry = registry()
            .with_dataset(Dataset::from_records(ChallengeGenerator::DATASET, vec![]).unwrap());

        let optimizer = Arc::new(RecordingOptimizer::default());
        let err = driver(registry, optimizer.clone())
            .run_job(&ChallengeGenerator)
            .await
            .unwrap_err();

        assert!(matches!(err, JobError::EmptyDataset(ref name) if name == ChallengeGenerator::DATASET));
        assert!(optimizer.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_dataset_is_a_no_op_for_full_jobs() {
        let registry = registry()
            .with_dataset(Dataset::from_records(UserSkillAgent::DATASET, vec![]).unwrap());

        let results = driver(registry, Arc::new(RecordingOptimizer::default()))
            .run_job(&UserSkillAgent)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_missing_prompt_is_a_registry_error() {
        let optimizer = Arc::new(RecordingOptimizer::default());
        let err = driver(InMemoryRegistry::new(), optimizer)
            .run_job(&UserSkillAgent)
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Registry(_)));
    }
}
