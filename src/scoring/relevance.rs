//! LLM-judged answer relevance.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::judge::RelevanceJudge;
use super::telemetry::TaskSpan;
use super::{ScoreError, ScoreResult, ScoringFunction};
use crate::dataset::{DatasetItem, MissingFieldError};

/// Builds the scoring context for an item: one fact per line, in a fixed
/// order.
pub type ContextBuilder = fn(&DatasetItem) -> Result<Vec<String>, MissingFieldError>;

/// Scores an output by asking a [`RelevanceJudge`] about it.
///
/// The judge sees the item's serialized `input`, the candidate output and the
/// job-specific scoring context.
#[derive(Clone)]
pub struct RelevanceScorer {
    context: ContextBuilder,
    judge: Arc<dyn RelevanceJudge>,
}

impl fmt::Debug for RelevanceScorer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelevanceScorer")
            .field("judge", &"<judge>")
            .finish()
    }
}

impl RelevanceScorer {
    pub const NAME: &'static str = "answer_relevance";

    pub fn new(context: ContextBuilder, judge: Arc<dyn RelevanceJudge>) -> Self {
        Self { context, judge }
    }

    /// The context lines the judge would see for `item`.
    pub fn scoring_context(&self, item: &DatasetItem) -> Result<Vec<String>, MissingFieldError> {
        (self.context)(item)
    }
}

#[async_trait]
impl ScoringFunction for RelevanceScorer {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn score(
        &self,
        item: &DatasetItem,
        output: &str,
        _span: Option<&TaskSpan>,
    ) -> Result<ScoreResult, ScoreError> {
        let context = self.scoring_context(item)?;
        let input = item.input_json()?;
        let verdict = self.judge.judge(&input, output, &context).await?;
        Ok(ScoreResult::new(Self::NAME, verdict.value).with_reason(verdict.reason))
    }
}
