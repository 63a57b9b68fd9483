use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::JudgeConfig;
use crate::models::TestCase;

/// Judge status codes: 1 queued, 2 processing, 3 accepted, 4 wrong answer,
/// 5 time limit, 6 compile error, 7+ runtime-error family.
const STATUS_RUNTIME_ERROR_THRESHOLD: i64 = 7;

#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("judge unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseStatus {
    InQueue,
    Processing,
    Accepted,
    WrongAnswer,
    TimeLimit,
    CompileError,
    RuntimeError,
}

impl CaseStatus {
    pub fn from_id(id: i64) -> Self {
        match id {
            1 => CaseStatus::InQueue,
            2 => CaseStatus::Processing,
            3 => CaseStatus::Accepted,
            4 => CaseStatus::WrongAnswer,
            5 => CaseStatus::TimeLimit,
            6 => CaseStatus::CompileError,
            id if id >= STATUS_RUNTIME_ERROR_THRESHOLD => CaseStatus::RuntimeError,
            // 0 / unknown: the judge never ran the case
            _ => CaseStatus::RuntimeError,
        }
    }

    /// Still queued or executing on the judge side.
    pub fn is_pending(&self) -> bool {
        matches!(self, CaseStatus::InQueue | CaseStatus::Processing)
    }
}

/// Outcome of one test case as reported by the judge.
#[derive(Debug, Clone)]
pub struct CaseResult {
    pub token: String,
    pub status: CaseStatus,
    pub stdout: String,
    pub stderr: String,
    pub compile_output: String,
    pub message: String,
}

/// Wire-level contract of the remote batch judge. One implementation talks
/// HTTP; tests substitute recording/scripted stubs.
#[async_trait]
pub trait JudgeTransport: Send + Sync {
    /// Submit one batch item per test case (same code, case-specific
    /// stdin/expected output). Returns one opaque handle per case.
    async fn create_batch(
        &self,
        code: &str,
        test_cases: &[TestCase],
    ) -> Result<Vec<String>, JudgeError>;

    /// Fetch current status for all handles of a batch.
    async fn fetch_batch(&self, tokens: &[String]) -> Result<Vec<CaseResult>, JudgeError>;
}

fn b64(s: &str) -> String {
    BASE64.encode(s.as_bytes())
}

/// Tolerant decode: the judge talks base64 on the wire so code and I/O
/// blobs survive transport intact, but a malformed field must not take the
/// whole result down.
fn b64_decode(value: Option<&str>) -> String {
    let Some(raw) = value else {
        return String::new();
    };
    if raw.is_empty() {
        return String::new();
    }
    match BASE64.decode(raw.trim_end_matches('\n').as_bytes()) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => raw.to_string(),
    }
}

/// Extract the per-item tokens from a batch-create response. The judge
/// answers with an array of `{"token": "..."}` objects.
pub fn parse_batch_tokens(data: &Value) -> Result<Vec<String>, JudgeError> {
    let rows = data
        .as_array()
        .ok_or_else(|| JudgeError::Unavailable(format!("batch response is not a list: {}", data)))?;

    let tokens: Vec<String> = rows
        .iter()
        .filter_map(|row| row.get("token").and_then(Value::as_str))
        .map(str::to_string)
        .collect();

    if tokens.is_empty() || tokens.len() != rows.len() {
        return Err(JudgeError::Unavailable(format!(
            "batch did not return a token per item: {}",
            data
        )));
    }

    Ok(tokens)
}

/// Decode a batch-status response. The judge wraps rows in
/// `{"submissions": [...]}`; some deployments answer with a bare list.
pub fn parse_batch_results(data: &Value) -> Result<Vec<CaseResult>, JudgeError> {
    let rows = data
        .get("submissions")
        .and_then(Value::as_array)
        .or_else(|| data.as_array())
        .ok_or_else(|| {
            JudgeError::Unavailable(format!("unexpected batch status response: {}", data))
        })?;

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        let status_id = row.get("status_id").and_then(Value::as_i64).unwrap_or(0);
        items.push(CaseResult {
            token: row
                .get("token")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            status: CaseStatus::from_id(status_id),
            stdout: b64_decode(row.get("stdout").and_then(Value::as_str)),
            stderr: b64_decode(row.get("stderr").and_then(Value::as_str)),
            compile_output: b64_decode(row.get("compile_output").and_then(Value::as_str)),
            message: b64_decode(row.get("message").and_then(Value::as_str)),
        });
    }

    Ok(items)
}

/// HTTP implementation of the judge wire protocol.
pub struct HttpJudge {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    api_host: Option<String>,
    language_id: u32,
}

impl HttpJudge {
    pub fn new(config: &JudgeConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            api_host: config.api_host.clone(),
            language_id: config.language_id,
        }
    }

    fn apply_headers(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match (&self.api_key, &self.api_host) {
            (Some(key), Some(host)) => req
                .header("X-RapidAPI-Key", key)
                .header("X-RapidAPI-Host", host),
            _ => req,
        }
    }
}

#[async_trait]
impl JudgeTransport for HttpJudge {
    async fn create_batch(
        &self,
        code: &str,
        test_cases: &[TestCase],
    ) -> Result<Vec<String>, JudgeError> {
        let url = format!("{}/submissions/batch?base64_encoded=true", self.base_url);

        let submissions: Vec<Value> = test_cases
            .iter()
            .map(|tc| {
                json!({
                    "language_id": self.language_id,
                    "source_code": b64(code),
                    "stdin": b64(&tc.stdin),
                    // The judge compares expected_output itself and reports
                    // wrong-answer per case.
                    "expected_output": b64(&tc.expected_stdout),
                })
            })
            .collect();

        let response = self
            .apply_headers(self.http.post(&url))
            .json(&json!({ "submissions": submissions }))
            .timeout(Duration::from_secs(25))
            .send()
            .await
            .map_err(|e| JudgeError::Unavailable(format!("batch create failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(JudgeError::Unavailable(format!(
                "batch create returned status {}",
                response.status()
            )));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| JudgeError::Unavailable(format!("batch create body: {}", e)))?;

        parse_batch_tokens(&data)
    }

    async fn fetch_batch(&self, tokens: &[String]) -> Result<Vec<CaseResult>, JudgeError> {
        // status_id instead of the verbose status object keeps payloads small
        let fields = "token,stdout,stderr,compile_output,message,status_id";
        let url = format!(
            "{}/submissions/batch?base64_encoded=true&tokens={}&fields={}",
            self.base_url,
            tokens.join(","),
            fields
        );

        let response = self
            .apply_headers(self.http.get(&url))
            .timeout(Duration::from_secs(25))
            .send()
            .await
            .map_err(|e| JudgeError::Unavailable(format!("batch status failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(JudgeError::Unavailable(format!(
                "batch status returned status {}",
                response.status()
            )));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| JudgeError::Unavailable(format!("batch status body: {}", e)))?;

        parse_batch_results(&data)
    }
}

/// Drives a batch to completion: submit once, then poll until every case
/// has left the queued/processing states or the deadline passes.
pub struct JudgeClient {
    transport: Arc<dyn JudgeTransport>,
    timeout: Duration,
    poll_interval: Duration,
}

impl JudgeClient {
    pub fn new(transport: Arc<dyn JudgeTransport>, timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            transport,
            timeout,
            poll_interval,
        }
    }

    pub fn from_config(transport: Arc<dyn JudgeTransport>, config: &JudgeConfig) -> Self {
        Self::new(
            transport,
            Duration::from_secs(config.timeout_seconds),
            Duration::from_millis(config.poll_interval_ms),
        )
    }

    pub async fn submit_batch(
        &self,
        code: &str,
        test_cases: &[TestCase],
    ) -> Result<Vec<String>, JudgeError> {
        self.transport.create_batch(code, test_cases).await
    }

    /// Polls until no case is pending or the wall-clock deadline elapses.
    /// Never fails merely because cases are still pending at the deadline:
    /// whatever is available is returned and callers grade pending cases as
    /// inconclusive.
    pub async fn await_batch(&self, tokens: &[String]) -> Result<Vec<CaseResult>, JudgeError> {
        let deadline = tokio::time::Instant::now() + self.timeout;

        loop {
            let items = self.transport.fetch_batch(tokens).await?;

            let pending = items.iter().filter(|it| it.status.is_pending()).count();
            if pending == 0 {
                return Ok(items);
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(
                    "Judge batch deadline reached with {} case(s) still pending",
                    pending
                );
                return Ok(items);
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    pub async fn run_batch(
        &self,
        code: &str,
        test_cases: &[TestCase],
    ) -> Result<Vec<CaseResult>, JudgeError> {
        let tokens = self.submit_batch(code, test_cases).await?;
        self.await_batch(&tokens).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_covers_the_runtime_error_family() {
        assert_eq!(CaseStatus::from_id(3), CaseStatus::Accepted);
        assert_eq!(CaseStatus::from_id(4), CaseStatus::WrongAnswer);
        assert_eq!(CaseStatus::from_id(5), CaseStatus::TimeLimit);
        assert_eq!(CaseStatus::from_id(6), CaseStatus::CompileError);
        for id in [7, 8, 11, 14] {
            assert_eq!(CaseStatus::from_id(id), CaseStatus::RuntimeError);
        }
        assert!(CaseStatus::from_id(1).is_pending());
        assert!(CaseStatus::from_id(2).is_pending());
    }

    #[test]
    fn batch_tokens_require_one_token_per_item() {
        let ok = serde_json::json!([{"token": "a"}, {"token": "b"}]);
        assert_eq!(parse_batch_tokens(&ok).unwrap(), vec!["a", "b"]);

        let missing = serde_json::json!([{"token": "a"}, {}]);
        assert!(parse_batch_tokens(&missing).is_err());

        let not_a_list = serde_json::json!({"error": "quota exceeded"});
        assert!(parse_batch_tokens(&not_a_list).is_err());
    }

    #[test]
    fn batch_results_decode_base64_fields() {
        let data = serde_json::json!({
            "submissions": [{
                "token": "t1",
                "status_id": 4,
                "stdout": BASE64.encode("hello"),
                "stderr": BASE64.encode("boom"),
                "compile_output": null,
                "message": null,
            }]
        });

        let items = parse_batch_results(&data).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].status, CaseStatus::WrongAnswer);
        assert_eq!(items[0].stdout, "hello");
        assert_eq!(items[0].stderr, "boom");
        assert_eq!(items[0].compile_output, "");
    }

    #[test]
    fn malformed_base64_falls_back_to_raw_text() {
        assert_eq!(b64_decode(Some("not base64!!")), "not base64!!");
        assert_eq!(b64_decode(None), "");
    }

    #[test]
    fn bare_list_status_responses_are_accepted() {
        let data = serde_json::json!([{"token": "t1", "status_id": 3}]);
        let items = parse_batch_results(&data).unwrap();
        assert_eq!(items[0].status, CaseStatus::Accepted);
    }
}
