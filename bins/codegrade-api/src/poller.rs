/// Polling Coordinator - Fan-out/Fan-in Status Tracking
///
/// **Core Responsibility:**
/// Query every tracking token until the execution service reports a terminal
/// status, or until the evaluation deadline passes.
///
/// **Execution Semantics:**
/// - One task per token, all running concurrently in a `JoinSet`
/// - Each task queries its token strictly sequentially: query, wait one
///   interval, query again
/// - A terminal status on the first query ends the task after that query
/// - Failed queries are retried on the same interval; after `max_retries`
///   consecutive failed retries the token becomes `InternalError`
/// - Outbound queries are capped by a shared semaphore
/// - One overall deadline: when it fires every unfinished task is abandoned
///   locally and its token is left out of the resolution
///
/// Results are keyed by token, not by completion order.

use codegrade_common::types::{SubmissionStatus, TrackingToken};
use codegrade_common::Config;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, instrument, warn};

use crate::error::JudgeError;
use crate::judge::{ExecutionBackend, StatusReport};
use crate::metrics;

const MIN_INTERVAL: Duration = Duration::from_millis(1);
// Stand-in for deadlines too large to add to `Instant::now()`
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub interval: Duration,
    pub deadline: Duration,
    pub max_retries: u32,
    pub max_in_flight: usize,
}

impl PollSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: config.poll_interval(),
            deadline: config.evaluation_deadline(),
            max_retries: config.max_poll_retries,
            max_in_flight: config.max_concurrent_polls,
        }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            deadline: Duration::from_secs(30),
            max_retries: 3,
            max_in_flight: 10,
        }
    }
}

/// Terminal result for one token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollResult {
    pub status: SubmissionStatus,
    pub actual_output: Option<String>,
    pub error_output: Option<String>,
    pub queries: u32,
}

/// Everything `resolve_all` learned before returning
#[derive(Debug, Default)]
pub struct Resolution {
    pub results: HashMap<TrackingToken, PollResult>,
    pub timed_out: bool,
}

impl Resolution {
    pub fn get(&self, token: &TrackingToken) -> Option<&PollResult> {
        self.results.get(token)
    }

    /// Number of `tokens` without a terminal result
    pub fn unresolved(&self, tokens: &[TrackingToken]) -> usize {
        tokens.iter().filter(|t| !self.results.contains_key(*t)).count()
    }
}

pub struct PollingCoordinator {
    backend: Arc<dyn ExecutionBackend>,
    settings: PollSettings,
    permits: Arc<Semaphore>,
}

impl PollingCoordinator {
    pub fn new(backend: Arc<dyn ExecutionBackend>, settings: PollSettings) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_in_flight.max(1)));
        Self {
            backend,
            settings,
            permits,
        }
    }

    /// Poll every token until terminal or until the deadline fires
    #[instrument(skip_all, fields(tokens = tokens.len()))]
    pub async fn resolve_all(&self, tokens: &[TrackingToken]) -> Resolution {
        let now = Instant::now();
        let deadline = now
            .checked_add(self.settings.deadline)
            .unwrap_or_else(|| now + FAR_FUTURE);
        let mut tasks = JoinSet::new();
        let mut seen = HashSet::new();

        for token in tokens {
            // Never query the same token from two tasks
            if !seen.insert(token.clone()) {
                continue;
            }
            let task = PollTask {
                token: token.clone(),
                backend: Arc::clone(&self.backend),
                permits: Arc::clone(&self.permits),
                interval: self.settings.interval.max(MIN_INTERVAL),
                max_retries: self.settings.max_retries,
            };
            tasks.spawn(task.run());
        }

        let mut resolution = Resolution::default();

        loop {
            match time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((token, result)))) => {
                    resolution.results.insert(token, result);
                }
                Ok(Some(Err(e))) => {
                    // Its token stays unresolved
                    error!(error = %e, "Poll task did not complete");
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        pending = tasks.len(),
                        resolved = resolution.results.len(),
                        "Evaluation deadline reached, abandoning unresolved polls"
                    );
                    tasks.abort_all();
                    resolution.timed_out = true;
                    break;
                }
            }
        }

        debug!(
            resolved = resolution.results.len(),
            unresolved = resolution.unresolved(tokens),
            "Polling finished"
        );
        resolution
    }
}

enum PollState {
    Query,
    Wait,
    Done(PollResult),
}

struct PollTask {
    token: TrackingToken,
    backend: Arc<dyn ExecutionBackend>,
    permits: Arc<Semaphore>,
    interval: Duration,
    max_retries: u32,
}

impl PollTask {
    #[instrument(skip(self), fields(token = %self.token))]
    async fn run(self) -> (TrackingToken, PollResult) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        let mut state = PollState::Query;
        let mut queries = 0u32;
        let mut failures = 0u32;

        loop {
            state = match state {
                PollState::Wait => {
                    ticker.tick().await;
                    PollState::Query
                }
                PollState::Query => {
                    queries += 1;
                    match self.query().await {
                        Ok(report) if report.status.is_terminal() => {
                            metrics::record_status_query("terminal");
                            debug!(status = %report.status, queries, "Submission finished");
                            PollState::Done(PollResult {
                                status: report.status,
                                actual_output: report.actual_output,
                                error_output: report.error_output,
                                queries,
                            })
                        }
                        Ok(report) => {
                            metrics::record_status_query("pending");
                            failures = 0;
                            debug!(status = %report.status, queries, "Submission still pending");
                            ticker.reset();
                            PollState::Wait
                        }
                        Err(e) => {
                            metrics::record_status_query("error");
                            failures += 1;
                            if failures > self.max_retries {
                                warn!(error = %e, queries, "Status query retries exhausted");
                                PollState::Done(PollResult {
                                    status: SubmissionStatus::InternalError,
                                    actual_output: None,
                                    error_output: Some(e.to_string()),
                                    queries,
                                })
                            } else {
                                warn!(error = %e, attempt = failures, "Status query failed, retrying");
                                ticker.reset();
                                PollState::Wait
                            }
                        }
                    }
                }
                PollState::Done(result) => return (self.token, result),
            };
        }
    }

    async fn query(&self) -> Result<StatusReport, JudgeError> {
        // The semaphore is never closed; a missing permit only means no throttling
        let _permit = self.permits.acquire().await.ok();
        self.backend.get_status(&self.token).await
    }
}
