//! Relevance judge.
//!
//! The judge is an external LLM asked to rate how relevant a candidate output
//! is to the request, given the scoring context. [`ChatCompletionsJudge`]
//! calls any OpenAI-compatible `/chat/completions` endpoint and expects a JSON
//! verdict back.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::ScoreError;
use crate::config::JudgeSettings;

const JUDGE_INSTRUCTIONS: &str = "You evaluate answer relevance. Given a user input, \
the context the answer must respect, and the answer itself, rate how relevant and \
appropriate the answer is for that input and context on a scale from 0.0 (irrelevant) \
to 1.0 (fully relevant). Reply with a JSON object only: \
{\"answer_relevance_score\": <float between 0.0 and 1.0>, \"reason\": \"<one or two sentences>\"}";

/// A relevance verdict.
#[derive(Debug, Clone, PartialEq)]
pub struct JudgeVerdict {
    /// Relevance in `[0, 1]`.
    pub value: f64,
    pub reason: Option<String>,
}

/// Rates the relevance of an output to its input and context.
#[async_trait]
pub trait RelevanceJudge: Send + Sync {
    async fn judge(
        &self,
        input: &str,
        output: &str,
        context: &[String],
    ) -> Result<JudgeVerdict, ScoreError>;
}

/// Build the user message sent to the judge.
pub fn judge_message(input: &str, output: &str, context: &[String]) -> String {
    let context_lines: Vec<String> = context.iter().map(|line| format!("- {}", line)).collect();
    format!(
        "INPUT:\n{}\n\nCONTEXT:\n{}\n\nANSWER:\n{}",
        input,
        context_lines.join("\n"),
        output
    )
}

/// Parse the judge's reply into a verdict.
///
/// Tolerates prose or code fences around the JSON object; the score must be a
/// finite number in `[0, 1]`.
pub fn parse_verdict(content: &str) -> Result<JudgeVerdict, ScoreError> {
    let start = content.find('{');
    let end = content.rfind('}');
    let json_text = match (start, end) {
        (Some(start), Some(end)) if start < end => &content[start..=end],
        _ => {
            return Err(ScoreError::Judge(format!(
                "no JSON object in judge reply: {}",
                truncate(content, 200)
            )))
        }
    };

    let verdict: Value = serde_json::from_str(json_text)
        .map_err(|e| ScoreError::Judge(format!("invalid verdict JSON: {}", e)))?;

    let value = verdict
        .get("answer_relevance_score")
        .and_then(Value::as_f64)
        .ok_or_else(|| ScoreError::Judge("verdict has no numeric answer_relevance_score".to_string()))?;

    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(ScoreError::Judge(format!(
            "answer_relevance_score {} is outside [0, 1]",
            value
        )));
    }

    let reason = verdict
        .get("reason")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(JudgeVerdict { value, reason })
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Judge backed by an OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone)]
pub struct ChatCompletionsJudge {
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f64,
    client: reqwest::Client,
}

impl ChatCompletionsJudge {
    pub fn from_settings(settings: &JudgeSettings, timeout: Duration) -> Result<Self, ScoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ScoreError::Judge(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Request body for one judgement.
    pub fn build_request_body(&self, input: &str, output: &str, context: &[String]) -> Value {
        json!({
            "model": self.model,
            "temperature": self.temperature,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": JUDGE_INSTRUCTIONS },
                { "role": "user", "content": judge_message(input, output, context) },
            ],
        })
    }
}

#[async_trait]
impl RelevanceJudge for ChatCompletionsJudge {
    async fn judge(
        &self,
        input: &str,
        output: &str,
        context: &[String],
    ) -> Result<JudgeVerdict, ScoreError> {
        let endpoint = format!("{}/chat/completions", self.base_url);
        let body = self.build_request_body(input, output, context);

        log::debug!(
            "judging relevance: model={}, context_lines={}, output_chars={}",
            self.model,
            context.len(),
            output.len()
        );

        let mut request = self.client.post(&endpoint).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ScoreError::Judge(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ScoreError::Judge(e.to_string()))?;

        if !status.is_success() {
            return Err(ScoreError::Judge(format!(
                "judge API error ({}): {}",
                status,
                truncate(&text, 500)
            )));
        }

        let reply: Value = serde_json::from_str(&text)
            .map_err(|e| ScoreError::Judge(format!("failed to parse judge response: {}", e)))?;
        let content = reply
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .ok_or_else(|| ScoreError::Judge("no message content in judge response".to_string()))?;

        parse_verdict(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_verdict() {
        let verdict =
            parse_verdict(r#"{"answer_relevance_score": 0.82, "reason": "Covers the goals."}"#)
                .unwrap();
        assert_eq!(verdict.value, 0.82);
        assert_eq!(verdict.reason.as_deref(), Some("Covers the goals."));
    }

    #[test]
    fn test_parse_fenced_verdict() {
        let reply = "```json\n{\"answer_relevance_score\": 1}\n```";
        let verdict = parse_verdict(reply).unwrap();
        assert_eq!(verdict.value, 1.0);
        assert_eq!(verdict.reason, None);
    }

    #[test]
    fn test_parse_rejects_out_of_range() {
        let err = parse_verdict(r#"{"answer_relevance_score": 7}"#).unwrap_err();
        assert!(matches!(err, ScoreError::Judge(msg) if msg.contains("outside")));
    }

    #[test]
    fn test_parse_rejects_missing_json() {
        assert!(parse_verdict("relevant enough").is_err());
        assert!(parse_verdict(r#"{"score": 0.5}"#).is_err());
    }

    #[test]
    fn test_judge_message_lists_context() {
        let context = vec![
            "User role: Data Analyst".to_string(),
            "User current skills: Python, SQL".to_string(),
        ];
        let message = judge_message("{\"user\":{}}", "[]", &context);
        assert!(message.contains("- User role: Data Analyst\n- User current skills: Python, SQL"));
        assert!(message.starts_with("INPUT:\n{\"user\":{}}"));
        assert!(message.ends_with("ANSWER:\n[]"));
    }

    #[test]
    fn test_request_body_shape() {
        let judge = ChatCompletionsJudge::from_settings(
            &JudgeSettings::default(),
            Duration::from_secs(10),
        )
        .unwrap();
        let body = judge.build_request_body("in", "out", &[]);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["response_format"]["type"], "json_object");
    }
}
