/// Execution Backend - Boundary to the Remote Judge
///
/// **Core Responsibility:**
/// Create submissions in one batch call and report their status on demand.
///
/// **Critical Architectural Boundary:**
/// - Backend knows HOW to talk to the execution service (HTTP, auth, status codes)
/// - Backend does NOT poll, wait or retry
/// - Backend does NOT decide pass/fail beyond the service's own verdict
///
/// Production uses `Judge0Backend`; tests use a scripted in-memory backend.

use async_trait::async_trait;
use codegrade_common::types::{Submission, SubmissionStatus, TrackingToken};
use codegrade_common::Config;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument};

use crate::error::{EvaluateError, JudgeError};
use crate::metrics;

/// Status of one submission as reported by the execution service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub status: SubmissionStatus,
    pub actual_output: Option<String>,
    pub error_output: Option<String>,
}

/// Execution backend contract
///
/// Any implementation must guarantee:
/// 1. `create_batch` returns exactly one token per submission, in order, or fails
/// 2. `get_status` is safe to call concurrently for different tokens
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    async fn create_batch(&self, submissions: &[Submission]) -> Result<Vec<TrackingToken>, JudgeError>;

    async fn get_status(&self, token: &TrackingToken) -> Result<StatusReport, JudgeError>;
}

/// Send the whole batch in one call
///
/// There is no partial success: either every submission gets a token or the
/// evaluation fails with `DispatchFailed`.
#[instrument(skip_all, fields(submissions = submissions.len()))]
pub async fn dispatch(
    backend: &dyn ExecutionBackend,
    submissions: &[Submission],
    language: &str,
) -> Result<Vec<TrackingToken>, EvaluateError> {
    if submissions.is_empty() {
        return Ok(Vec::new());
    }

    let tokens = backend.create_batch(submissions).await.map_err(|e| {
        error!(error = %e, "Batch dispatch failed");
        metrics::record_dispatch_failed();
        EvaluateError::DispatchFailed(e)
    })?;

    if tokens.len() != submissions.len() {
        error!(
            expected = submissions.len(),
            received = tokens.len(),
            "Token count does not match batch size"
        );
        metrics::record_dispatch_failed();
        return Err(EvaluateError::DispatchFailed(JudgeError::MalformedResponse(format!(
            "expected {} tokens, received {}",
            submissions.len(),
            tokens.len()
        ))));
    }

    metrics::record_submissions_dispatched(language, tokens.len());
    info!(tokens = tokens.len(), "Batch dispatched");

    Ok(tokens)
}

/// Map a Judge0 status id onto the submission state machine
///
/// Unknown ids are treated as non-terminal so they keep being polled.
pub fn status_from_judge0_id(id: u32) -> SubmissionStatus {
    match id {
        1 => SubmissionStatus::Queued,
        2 => SubmissionStatus::Running,
        3 => SubmissionStatus::Accepted,
        4 => SubmissionStatus::WrongAnswer,
        5 => SubmissionStatus::TimeLimitExceeded,
        6 => SubmissionStatus::CompileError,
        7..=12 => SubmissionStatus::RuntimeError,
        13 | 14 => SubmissionStatus::InternalError,
        _ => SubmissionStatus::Running,
    }
}

/// Pull one token per entry out of a batch reply
///
/// Judge0 answers a rejected entry with its validation errors in place of a
/// token, e.g. `{"language_id": ["is not valid"]}`. Any such entry fails the
/// whole batch.
pub fn tokens_from_batch_reply(entries: Vec<Value>) -> Result<Vec<TrackingToken>, JudgeError> {
    entries
        .iter()
        .enumerate()
        .map(|(idx, entry)| {
            entry
                .get("token")
                .and_then(|t| t.as_str())
                .map(TrackingToken::new)
                .ok_or_else(|| {
                    JudgeError::MalformedResponse(format!(
                        "submission {} was not accepted: {}",
                        idx, entry
                    ))
                })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct Judge0Status {
    id: u32,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct Judge0Submission {
    stdout: Option<String>,
    stderr: Option<String>,
    compile_output: Option<String>,
    message: Option<String>,
    status: Option<Judge0Status>,
}

impl From<Judge0Submission> for StatusReport {
    fn from(raw: Judge0Submission) -> Self {
        // A missing status block means the service has not picked it up yet
        let status = raw
            .status
            .as_ref()
            .map(|s| status_from_judge0_id(s.id))
            .unwrap_or(SubmissionStatus::Queued);

        let error_output = [raw.compile_output, raw.stderr, raw.message]
            .into_iter()
            .flatten()
            .find(|s| !s.trim().is_empty());

        StatusReport {
            status,
            actual_output: raw.stdout,
            error_output,
        }
    }
}

/// Judge0 REST client
///
/// The inner `reqwest::Client` pools connections and is shared by every
/// concurrent status query.
pub struct Judge0Backend {
    client: reqwest::Client,
    base_url: String,
}

impl Judge0Backend {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &config.judge_api_key {
            headers.insert("x-rapidapi-key", HeaderValue::from_str(key)?);
        }
        if let Some(host) = &config.judge_api_host {
            headers.insert("x-rapidapi-host", HeaderValue::from_str(host)?);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.http_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: config.judge_url.trim_end_matches('/').to_string(),
        })
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, JudgeError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(JudgeError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl ExecutionBackend for Judge0Backend {
    async fn create_batch(&self, submissions: &[Submission]) -> Result<Vec<TrackingToken>, JudgeError> {
        let url = format!("{}/submissions/batch?base64_encoded=false", self.base_url);
        let payload = json!({ "submissions": submissions });

        let response = self.client.post(&url).json(&payload).send().await?;
        let entries: Vec<Value> = Self::check(response).await?.json().await?;

        tokens_from_batch_reply(entries)
    }

    async fn get_status(&self, token: &TrackingToken) -> Result<StatusReport, JudgeError> {
        let url = format!(
            "{}/submissions/{}?base64_encoded=false&fields=stdout,stderr,compile_output,message,status",
            self.base_url, token
        );

        let response = self.client.get(&url).send().await?;
        let raw: Judge0Submission = Self::check(response).await?.json().await?;

        if let Some(status) = &raw.status {
            debug!(token = %token, status_id = status.id, description = %status.description, "Status received");
        }

        Ok(raw.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedBackend;

    fn submission(stdin: &str) -> Submission {
        Submission {
            source_code: "print(input())".to_string(),
            language_id: 71,
            stdin: stdin.to_string(),
            expected_output: stdin.to_string(),
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_from_judge0_id(1), SubmissionStatus::Queued);
        assert_eq!(status_from_judge0_id(2), SubmissionStatus::Running);
        assert_eq!(status_from_judge0_id(3), SubmissionStatus::Accepted);
        assert_eq!(status_from_judge0_id(4), SubmissionStatus::WrongAnswer);
        assert_eq!(status_from_judge0_id(5), SubmissionStatus::TimeLimitExceeded);
        assert_eq!(status_from_judge0_id(6), SubmissionStatus::CompileError);
        assert_eq!(status_from_judge0_id(11), SubmissionStatus::RuntimeError);
        assert_eq!(status_from_judge0_id(13), SubmissionStatus::InternalError);
    }

    #[test]
    fn test_unknown_status_is_non_terminal() {
        assert!(!status_from_judge0_id(99).is_terminal());
        assert!(!status_from_judge0_id(0).is_terminal());
    }

    #[test]
    fn test_judge0_payload_conversion() {
        let raw: Judge0Submission = serde_json::from_str(
            r#"{"stdout":null,"stderr":null,"compile_output":"main.c:1: error","message":null,
                "status":{"id":6,"description":"Compilation Error"}}"#,
        )
        .unwrap();
        let report = StatusReport::from(raw);
        assert_eq!(report.status, SubmissionStatus::CompileError);
        assert_eq!(report.actual_output, None);
        assert_eq!(report.error_output.as_deref(), Some("main.c:1: error"));

        let raw: Judge0Submission = serde_json::from_str(r#"{"stdout":"42\n"}"#).unwrap();
        let report = StatusReport::from(raw);
        assert_eq!(report.status, SubmissionStatus::Queued);
        assert_eq!(report.actual_output.as_deref(), Some("42\n"));
    }

    #[test]
    fn test_batch_reply_tokens() {
        let entries = vec![json!({"token": "abc"}), json!({"token": "def"})];

        let tokens = tokens_from_batch_reply(entries).unwrap();

        assert_eq!(tokens, vec![TrackingToken::new("abc"), TrackingToken::new("def")]);
    }

    #[test]
    fn test_batch_reply_with_rejected_entry() {
        let entries = vec![
            json!({"token": "abc"}),
            json!({"language_id": ["is not valid"]}),
        ];

        let err = tokens_from_batch_reply(entries).unwrap_err();

        match err {
            JudgeError::MalformedResponse(detail) => {
                assert!(detail.contains("submission 1"));
                assert!(detail.contains("is not valid"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_batch_reply_with_non_string_token() {
        let err = tokens_from_batch_reply(vec![json!({"token": 42})]).unwrap_err();
        assert!(matches!(err, JudgeError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_dispatch_returns_tokens_in_order() {
        let backend = ScriptedBackend::new();
        let batch = vec![submission("a"), submission("b"), submission("c")];

        let tokens = dispatch(&backend, &batch, "python").await.unwrap();

        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].as_str(), "token-0");
        assert_eq!(tokens[2].as_str(), "token-2");
        assert_eq!(backend.batch_calls(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_failure_is_fatal() {
        let backend = ScriptedBackend::new().rejecting_batches();

        let err = dispatch(&backend, &[submission("a")], "python").await.unwrap_err();

        assert!(matches!(err, EvaluateError::DispatchFailed(_)));
    }

    #[tokio::test]
    async fn test_dispatch_rejects_short_token_list() {
        let backend = ScriptedBackend::new().returning_tokens(1);

        let err = dispatch(&backend, &[submission("a"), submission("b")], "python")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            EvaluateError::DispatchFailed(JudgeError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_batch_is_never_sent() {
        let backend = ScriptedBackend::new();

        let tokens = dispatch(&backend, &[], "python").await.unwrap();

        assert!(tokens.is_empty());
        assert_eq!(backend.batch_calls(), 0);
    }
}
