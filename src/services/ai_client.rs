use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::AssistConfig;
use crate::models::hint::HintLevel;

#[derive(Debug, Error)]
pub enum HintModelError {
    #[error("hint model unavailable: {0}")]
    Unavailable(String),
    #[error("malformed hint model output: {0}")]
    Malformed(String),
}

/// Structured result of one generation call. The no_code_confirmed flag is
/// the provider's self-report and is never trusted on its own; the
/// sanitizer runs regardless.
#[derive(Debug, Clone)]
pub struct HintModelOutput {
    pub text: String,
    pub no_code_confirmed: bool,
    pub model: String,
    pub tokens_in: Option<u32>,
    pub tokens_out: Option<u32>,
}

/// Contract of the external text-generation provider: a system instruction
/// plus a context blob in, `{text, no_code_confirmed}` out. Any provider
/// with schema-constrained output can implement it; tests use recording
/// stubs.
#[async_trait]
pub trait HintModel: Send + Sync {
    async fn generate(
        &self,
        level: HintLevel,
        prompt_snapshot: &str,
    ) -> Result<HintModelOutput, HintModelError>;
}

/// Level-specific tutor instruction. Both levels hard-forbid code; level 1
/// stays diagnostic, level 2 describes an approach in plain language.
pub fn system_rules(level: HintLevel) -> &'static str {
    match level {
        HintLevel::One => {
            "You are a strict programming tutor. \
             Task: diagnose why the student's code fails. \
             Rules: DO NOT provide any code, pseudocode, or step-by-step full solution. \
             Only explain the reasons of errors and what part of logic is wrong. \
             Use short bullets. Mention line/section references if possible. \
             If the student code is correct, say so."
        }
        HintLevel::Two => {
            "You are a strict programming tutor. \
             Task: provide a textual solution path. \
             Rules: DO NOT provide code, pseudocode, or near-code. \
             Explain the approach in plain language only, focusing on steps and reasoning. \
             Do not reveal the final algorithm in full detail; provide guidance."
        }
    }
}

/// Chat-completions implementation of the provider contract with a
/// JSON-schema constrained response format.
pub struct OpenAiHintModel {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl OpenAiHintModel {
    pub fn new(config: &AssistConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_seconds),
        }
    }
}

#[async_trait]
impl HintModel for OpenAiHintModel {
    async fn generate(
        &self,
        level: HintLevel,
        prompt_snapshot: &str,
    ) -> Result<HintModelOutput, HintModelError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_rules(level) },
                { "role": "user", "content": prompt_snapshot },
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": format!("hint_level_{}", level.as_u8()),
                    "strict": true,
                    "schema": {
                        "type": "object",
                        "properties": {
                            "text": { "type": "string" },
                            "no_code_confirmed": { "type": "boolean" },
                        },
                        "required": ["text", "no_code_confirmed"],
                        "additionalProperties": false,
                    },
                },
            },
            "max_tokens": 450,
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| HintModelError::Unavailable(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(HintModelError::Unavailable(format!(
                "provider returned status {}",
                response.status()
            )));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| HintModelError::Malformed(format!("body decode: {}", e)))?;

        let content = data["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| HintModelError::Malformed("missing message content".to_string()))?;

        let parsed: Value = serde_json::from_str(content)
            .map_err(|e| HintModelError::Malformed(format!("content is not JSON: {}", e)))?;

        let text = parsed["text"]
            .as_str()
            .ok_or_else(|| HintModelError::Malformed("missing text field".to_string()))?
            .to_string();
        let no_code_confirmed = parsed["no_code_confirmed"].as_bool().unwrap_or(false);

        let tokens_in = data["usage"]["prompt_tokens"].as_u64().map(|v| v as u32);
        let tokens_out = data["usage"]["completion_tokens"].as_u64().map(|v| v as u32);

        Ok(HintModelOutput {
            text,
            no_code_confirmed,
            model: self.model.clone(),
            tokens_in,
            tokens_out,
        })
    }
}
