/// Code Evaluator - the single entry point the rest of the application uses
///
/// Pipeline:
/// 1. Resolve the language (unknown names fall back to JavaScript)
/// 2. Build one submission per test case
/// 3. Dispatch the batch, poll every token, aggregate the results
/// 4. Request structured feedback
///
/// Questions without test cases skip steps 2-3 and get quality-only feedback.
/// Dispatch and feedback failures abort the evaluation; per-case failures and
/// the evaluation deadline only show up inside the outcome.

use chrono::Utc;
use codegrade_common::types::{EvaluationOutcome, EvaluationReport, EvaluationRequest, Language};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::aggregator::aggregate;
use crate::error::EvaluateError;
use crate::feedback::FeedbackRequester;
use crate::judge::{dispatch, ExecutionBackend};
use crate::metrics;
use crate::poller::PollingCoordinator;
use crate::submission::build_submissions;

pub struct CodeEvaluator {
    backend: Arc<dyn ExecutionBackend>,
    coordinator: PollingCoordinator,
    feedback: FeedbackRequester,
}

impl CodeEvaluator {
    pub fn new(
        backend: Arc<dyn ExecutionBackend>,
        coordinator: PollingCoordinator,
        feedback: FeedbackRequester,
    ) -> Self {
        Self {
            backend,
            coordinator,
            feedback,
        }
    }

    pub async fn evaluate(&self, request: &EvaluationRequest) -> Result<EvaluationReport, EvaluateError> {
        self.evaluate_with_id(Uuid::new_v4(), request).await
    }

    #[instrument(skip(self, request), fields(language = %request.language, tests = request.question.test_cases.len()))]
    pub async fn evaluate_with_id(
        &self,
        evaluation_id: Uuid,
        request: &EvaluationRequest,
    ) -> Result<EvaluationReport, EvaluateError> {
        let result = self.run(evaluation_id, request).await;

        match &result {
            Ok(report) => {
                metrics::record_evaluation(if report.outcome.timed_out { "timed_out" } else { "ok" });
                info!(
                    score = report.feedback.score,
                    passed = report.outcome.passed_tests,
                    total = report.outcome.total_tests,
                    "Evaluation complete"
                );
            }
            Err(e) => {
                metrics::record_evaluation(e.kind());
                warn!(error = %e, "Evaluation failed");
            }
        }

        result
    }

    async fn run(
        &self,
        evaluation_id: Uuid,
        request: &EvaluationRequest,
    ) -> Result<EvaluationReport, EvaluateError> {
        if Language::from_str(&request.language).is_none() {
            warn!(requested = %request.language, "Unrecognised language, falling back to javascript");
        }
        let language = Language::resolve(&request.language);
        let language_id = language.judge_id();
        let test_cases = &request.question.test_cases;
        // Covers execution and feedback; observed when the report is returned
        let _timer = metrics::evaluation_timer(if test_cases.is_empty() {
            "quality_only"
        } else {
            "with_tests"
        });

        let outcome = if test_cases.is_empty() {
            info!("No test cases, using quality-only feedback");
            EvaluationOutcome::empty()
        } else {
            let submissions = build_submissions(&request.code, language_id, test_cases);
            let tokens = dispatch(self.backend.as_ref(), &submissions, &language.to_string()).await?;
            let resolution = self.coordinator.resolve_all(&tokens).await;
            aggregate(test_cases, &tokens, &resolution)
        };

        let feedback = self
            .feedback
            .request_feedback(&request.question, &request.code, &language.to_string(), &outcome)
            .await?;

        Ok(EvaluationReport {
            evaluation_id,
            language,
            language_id,
            outcome,
            feedback,
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::TextGenerator;
    use crate::poller::PollSettings;
    use crate::testing::{CannedGenerator, ScriptedBackend, Step, FEEDBACK_REPLY};
    use codegrade_common::types::{Question, SubmissionStatus, TestCase};
    use std::time::Duration;

    fn request(language: &str, cases: usize) -> EvaluationRequest {
        EvaluationRequest {
            question: Question {
                title: "Double It".to_string(),
                description: "Print twice the input.".to_string(),
                test_cases: (0..cases)
                    .map(|i| TestCase {
                        input: i.to_string(),
                        expected_output: (i * 2).to_string(),
                        explanation: None,
                    })
                    .collect(),
            },
            code: "print(2 * int(input()))".to_string(),
            language: language.to_string(),
        }
    }

    fn evaluator(
        backend: &Arc<ScriptedBackend>,
        generator: &Arc<CannedGenerator>,
        deadline: Duration,
    ) -> CodeEvaluator {
        let backend: Arc<dyn ExecutionBackend> = backend.clone();
        let generator: Arc<dyn TextGenerator> = generator.clone();
        let settings = PollSettings {
            interval: Duration::from_millis(10),
            deadline,
            max_retries: 2,
            max_in_flight: 4,
        };
        CodeEvaluator::new(
            backend.clone(),
            PollingCoordinator::new(backend, settings),
            FeedbackRequester::new(generator).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_three_of_five_scenario() {
        let wrong = vec![
            Step::Status(SubmissionStatus::Running, None),
            Step::Status(SubmissionStatus::WrongAnswer, Some("7")),
        ];
        let backend = Arc::new(
            ScriptedBackend::new()
                .script(1, wrong.clone())
                .script(3, vec![Step::Status(SubmissionStatus::RuntimeError, None)]),
        );
        let generator = Arc::new(CannedGenerator::replying(FEEDBACK_REPLY));

        let report = evaluator(&backend, &generator, Duration::from_secs(5))
            .evaluate(&request("Python", 5))
            .await
            .unwrap();

        assert_eq!(report.language, Language::Python);
        assert_eq!(report.language_id, 71);
        assert_eq!(report.outcome.total_tests, 5);
        assert_eq!(report.outcome.passed_tests, 3);
        assert_eq!(report.outcome.results.len(), 5);
        assert_eq!(report.outcome.results[1].status, SubmissionStatus::WrongAnswer);
        assert_eq!(report.feedback.score, 72);
        assert!(generator.prompts()[0].contains("3/5"));
        assert_eq!(backend.batch_calls(), 1);
    }

    #[tokio::test]
    async fn test_no_test_cases_uses_quality_only_path() {
        let backend = Arc::new(ScriptedBackend::new());
        let generator = Arc::new(CannedGenerator::replying(FEEDBACK_REPLY));

        let report = evaluator(&backend, &generator, Duration::from_secs(5))
            .evaluate(&request("java", 0))
            .await
            .unwrap();

        assert_eq!(backend.batch_calls(), 0);
        assert_eq!(report.outcome.total_tests, 0);
        let prompt = &generator.prompts()[0];
        assert!(!prompt.contains("passed"));
        assert!(!prompt.contains("0/0"));
    }

    #[tokio::test]
    async fn test_evaluation_time_includes_feedback() {
        let backend = Arc::new(ScriptedBackend::new());
        let generator = Arc::new(
            CannedGenerator::replying(FEEDBACK_REPLY).with_delay(Duration::from_millis(300)),
        );
        let histogram = metrics::EVALUATION_TIME.with_label_values(&["quality_only"]);
        let before = histogram.get_sample_sum();

        evaluator(&backend, &generator, Duration::from_secs(5))
            .evaluate(&request("python", 0))
            .await
            .unwrap();

        // other tests may observe concurrently, which only adds to the sum
        assert!(histogram.get_sample_sum() - before >= 0.3);
    }

    #[tokio::test]
    async fn test_dispatch_failure_aborts_before_feedback() {
        let backend = Arc::new(ScriptedBackend::new().rejecting_batches());
        let generator = Arc::new(CannedGenerator::replying(FEEDBACK_REPLY));

        let err = evaluator(&backend, &generator, Duration::from_secs(5))
            .evaluate(&request("c", 2))
            .await
            .unwrap_err();

        assert!(matches!(err, EvaluateError::DispatchFailed(_)));
        assert!(generator.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_unparseable_feedback_fails_evaluation() {
        let backend = Arc::new(ScriptedBackend::new());
        let generator = Arc::new(CannedGenerator::replying("Great job, 9/10!"));

        let err = evaluator(&backend, &generator, Duration::from_secs(5))
            .evaluate(&request("cpp", 2))
            .await
            .unwrap_err();

        assert!(matches!(err, EvaluateError::FeedbackParseFailure(_)));
    }

    #[tokio::test]
    async fn test_unknown_language_runs_as_javascript() {
        let backend = Arc::new(ScriptedBackend::new());
        let generator = Arc::new(CannedGenerator::replying(FEEDBACK_REPLY));

        let report = evaluator(&backend, &generator, Duration::from_secs(5))
            .evaluate(&request("brainfuck", 1))
            .await
            .unwrap();

        assert_eq!(report.language, Language::JavaScript);
        assert_eq!(report.language_id, Language::JavaScript.judge_id());
    }

    #[tokio::test]
    async fn test_deadline_produces_partial_report() {
        let backend = Arc::new(
            ScriptedBackend::new().script(2, vec![Step::Status(SubmissionStatus::Queued, None)]),
        );
        let generator = Arc::new(CannedGenerator::replying(FEEDBACK_REPLY));

        let report = evaluator(&backend, &generator, Duration::from_millis(120))
            .evaluate(&request("python", 3))
            .await
            .unwrap();

        assert!(report.outcome.timed_out);
        assert_eq!(report.outcome.results.len(), 3);
        assert_eq!(report.outcome.passed_tests, 2);
        assert_eq!(report.outcome.results[2].status, SubmissionStatus::Unresolved);
        assert!(generator.prompts()[0].contains("2/3"));
    }
}
