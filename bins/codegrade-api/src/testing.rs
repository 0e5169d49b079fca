// In-memory collaborators for unit tests

use async_trait::async_trait;
use codegrade_common::types::{Submission, SubmissionStatus, TrackingToken};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{GenerationError, JudgeError};
use crate::judge::{ExecutionBackend, StatusReport};
use crate::llm::TextGenerator;

/// One scripted reply to a status query
#[derive(Debug, Clone)]
pub enum Step {
    Status(SubmissionStatus, Option<&'static str>),
    Fail,
}

/// Execution backend driven by per-token scripts
///
/// Tokens are `token-{index}`. Each token replays its script, repeating the
/// last step once the script runs out. Unscripted tokens answer `Accepted`.
pub struct ScriptedBackend {
    scripts: HashMap<String, Vec<Step>>,
    queries: Mutex<HashMap<String, usize>>,
    started: Mutex<HashMap<String, Vec<Instant>>>,
    in_flight: Mutex<HashSet<String>>,
    overlapping_query: AtomicBool,
    batch_calls: AtomicUsize,
    reject_batches: bool,
    token_limit: Option<usize>,
    latency: Duration,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            queries: Mutex::new(HashMap::new()),
            started: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashSet::new()),
            overlapping_query: AtomicBool::new(false),
            batch_calls: AtomicUsize::new(0),
            reject_batches: false,
            token_limit: None,
            latency: Duration::ZERO,
        }
    }

    pub fn script(mut self, index: usize, steps: Vec<Step>) -> Self {
        self.scripts.insert(format!("token-{}", index), steps);
        self
    }

    pub fn rejecting_batches(mut self) -> Self {
        self.reject_batches = true;
        self
    }

    pub fn returning_tokens(mut self, limit: usize) -> Self {
        self.token_limit = Some(limit);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self, index: usize) -> usize {
        self.queries
            .lock()
            .unwrap()
            .get(&format!("token-{}", index))
            .copied()
            .unwrap_or(0)
    }

    /// When each status query for `token-{index}` arrived
    pub fn query_starts(&self, index: usize) -> Vec<Instant> {
        self.started
            .lock()
            .unwrap()
            .get(&format!("token-{}", index))
            .cloned()
            .unwrap_or_default()
    }

    pub fn saw_overlapping_query(&self) -> bool {
        self.overlapping_query.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecutionBackend for ScriptedBackend {
    async fn create_batch(&self, submissions: &[Submission]) -> Result<Vec<TrackingToken>, JudgeError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_batches {
            return Err(JudgeError::Rejected {
                status: 401,
                body: "invalid key".to_string(),
            });
        }
        let count = self.token_limit.unwrap_or(submissions.len());
        Ok((0..count)
            .map(|idx| TrackingToken::new(format!("token-{}", idx)))
            .collect())
    }

    async fn get_status(&self, token: &TrackingToken) -> Result<StatusReport, JudgeError> {
        let key = token.as_str().to_string();
        if !self.in_flight.lock().unwrap().insert(key.clone()) {
            self.overlapping_query.store(true, Ordering::SeqCst);
        }

        self.started
            .lock()
            .unwrap()
            .entry(key.clone())
            .or_default()
            .push(Instant::now());

        let attempt = {
            let mut queries = self.queries.lock().unwrap();
            let count = queries.entry(key.clone()).or_insert(0);
            *count += 1;
            *count - 1
        };

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.lock().unwrap().remove(&key);

        let step = match self.scripts.get(&key) {
            Some(steps) if !steps.is_empty() => steps[attempt.min(steps.len() - 1)].clone(),
            _ => Step::Status(SubmissionStatus::Accepted, None),
        };

        match step {
            Step::Status(status, output) => Ok(StatusReport {
                status,
                actual_output: output.map(str::to_string),
                error_output: None,
            }),
            Step::Fail => Err(JudgeError::Rejected {
                status: 503,
                body: "service unavailable".to_string(),
            }),
        }
    }
}

/// Text generator returning a fixed reply and recording every prompt
pub struct CannedGenerator {
    reply: Result<String, ()>,
    prompts: Mutex<Vec<String>>,
    delay: Duration,
}

impl CannedGenerator {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: Err(()),
            prompts: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for CannedGenerator {
    async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.reply.clone().map_err(|_| GenerationError::MissingResponse)
    }
}

pub const FEEDBACK_REPLY: &str = r#"Here is my evaluation:
```json
{"score": 72, "correctness": "Handles most inputs", "complexity": "O(n log n)",
 "quality": "Readable", "alternatives": ["Use a hash map for O(n)"]}
```
Good luck!"#;
