use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use uuid::Uuid;

/// Languages accepted by the remote execution service
/// Identifiers are the Judge0 CE language ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    JavaScript,
    Python,
    Java,
    C,
    Cpp,
}

impl Language {
    /// Returns all language variants
    /// This is the single source of truth for available languages
    pub fn all_variants() -> &'static [Language] {
        &[
            Language::JavaScript,
            Language::Python,
            Language::Java,
            Language::C,
            Language::Cpp,
        ]
    }

    /// Parse a language from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Language> {
        match s.trim().to_lowercase().as_str() {
            "javascript" => Some(Language::JavaScript),
            "python" => Some(Language::Python),
            "java" => Some(Language::Java),
            "c" => Some(Language::C),
            "cpp" => Some(Language::Cpp),
            _ => None,
        }
    }

    /// Resolve a human-readable language name, never failing
    ///
    /// Unrecognised names resolve to JavaScript. Evaluation is never blocked
    /// on a misspelled language; callers that need to detect unknown names
    /// use [`Language::from_str`] instead.
    pub fn resolve(name: &str) -> Language {
        Self::from_str(name).unwrap_or(Language::JavaScript)
    }

    /// Identifier the execution service uses for this language
    pub fn judge_id(&self) -> u32 {
        match self {
            Language::JavaScript => 63,
            Language::Python => 71,
            Language::Java => 62,
            Language::C => 50,
            Language::Cpp => 54,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::JavaScript => write!(f, "javascript"),
            Language::Python => write!(f, "python"),
            Language::Java => write!(f, "java"),
            Language::C => write!(f, "c"),
            Language::Cpp => write!(f, "cpp"),
        }
    }
}

/// Map a language name to the execution service's identifier
/// Same fallback as [`Language::resolve`]
pub fn resolve_language_id(name: &str) -> u32 {
    Language::resolve(name).judge_id()
}

/// Test Case Definition (Immutable Input)
/// Ordering matters - it defines report order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    #[serde(alias = "expectedOutput")]
    pub expected_output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Coding question the candidate answered
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "testCases")]
    pub test_cases: Vec<TestCase>,
}

/// One (code, test case) pairing sent to the execution service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub source_code: String,
    pub language_id: u32,
    pub stdin: String,
    pub expected_output: String,
}

/// Opaque handle returned by the execution service for a submission
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackingToken(pub String);

impl TrackingToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackingToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Submission State Machine
///
/// `Queued` and `Running` are the only non-terminal states. The execution
/// service is the authority on every value except `Unresolved`, which is
/// assigned locally when the evaluation deadline passes before a terminal
/// status was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Queued,
    Running,
    Accepted,
    WrongAnswer,
    RuntimeError,
    CompileError,
    TimeLimitExceeded,
    InternalError,
    Unresolved,
}

impl SubmissionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SubmissionStatus::Queued | SubmissionStatus::Running)
    }

    pub fn is_passed(&self) -> bool {
        *self == SubmissionStatus::Accepted
    }

    pub fn label(&self) -> &'static str {
        match self {
            SubmissionStatus::Queued => "queued",
            SubmissionStatus::Running => "running",
            SubmissionStatus::Accepted => "accepted",
            SubmissionStatus::WrongAnswer => "wrong_answer",
            SubmissionStatus::RuntimeError => "runtime_error",
            SubmissionStatus::CompileError => "compile_error",
            SubmissionStatus::TimeLimitExceeded => "time_limit_exceeded",
            SubmissionStatus::InternalError => "internal_error",
            SubmissionStatus::Unresolved => "unresolved",
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-Test Result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseResult {
    pub test_case: TestCase,
    pub status: SubmissionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_output: Option<String>,
}

/// Aggregated pass/fail summary for one evaluation request
///
/// ## Invariants:
/// - passed_tests <= total_tests
/// - results.len() == total_tests, even after the deadline fired
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationOutcome {
    pub total_tests: usize,
    pub passed_tests: usize,
    pub results: Vec<CaseResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub timed_out: bool,
}

impl EvaluationOutcome {
    /// Outcome for a question without test cases
    pub fn empty() -> Self {
        Self {
            total_tests: 0,
            passed_tests: 0,
            results: Vec::new(),
            failure_reason: None,
            timed_out: false,
        }
    }

    pub fn has_tests(&self) -> bool {
        self.total_tests > 0
    }

    /// "passed/total", e.g. "3/5"
    pub fn summary(&self) -> String {
        format!("{}/{}", self.passed_tests, self.total_tests)
    }
}

/// Feedback extracted from the text-generation reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredFeedback {
    #[serde(deserialize_with = "score_from_value")]
    pub score: u32,
    #[serde(default, deserialize_with = "text_from_value")]
    pub correctness: String,
    #[serde(default, deserialize_with = "text_from_value")]
    pub complexity: String,
    #[serde(default, deserialize_with = "text_from_value")]
    pub quality: String,
    #[serde(default, deserialize_with = "one_or_many")]
    pub alternatives: Vec<String>,
}

/// Upstream input: evaluate `code` against `question`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationRequest {
    pub question: Question,
    pub code: String,
    pub language: String,
}

/// Upstream output, also the document persisted in Redis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub evaluation_id: Uuid,
    pub language: Language,
    pub language_id: u32,
    pub outcome: EvaluationOutcome,
    pub feedback: StructuredFeedback,
    pub created_at: DateTime<Utc>,
}

// Scores arrive as integers, floats or numeric strings; clamp to 0..=100.
fn score_from_value<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value = serde_json::Value::deserialize(deserializer)?;
    let raw = match &value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
    .ok_or_else(|| D::Error::custom(format!("score is not a number: {}", value)))?;

    Ok(raw.round().clamp(0.0, 100.0) as u32)
}

fn text_from_value<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Null => Vec::new(),
        serde_json::Value::String(s) if s.trim().is_empty() => Vec::new(),
        serde_json::Value::String(s) => vec![s],
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
        other => vec![other.to_string()],
    })
}
