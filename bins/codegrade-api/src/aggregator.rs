/// Result Aggregator - Pure Outcome Assembly
///
/// **Core Responsibility:**
/// Re-associate terminal statuses with their test cases and count passes.
///
/// **Critical Properties:**
/// - Knows nothing about HTTP or the execution service
/// - Pure function: (test cases, tokens, resolution) → outcome
/// - Does not explain failures; that is left to the feedback step
///
/// **Counting Rules:**
/// - passed_tests = cases whose status is exactly `Accepted`
/// - every other status, including `Unresolved`, counts as not passed
/// - one result per test case, always in test-case order

use codegrade_common::types::{
    CaseResult, EvaluationOutcome, SubmissionStatus, TestCase, TrackingToken,
};
use tracing::{debug, info};

use crate::metrics;
use crate::poller::Resolution;

/// Build the evaluation outcome
///
/// `tokens[i]` is the token of `test_cases[i]`. A test case whose token has no
/// result (deadline fired, or no token at all) is recorded as `Unresolved`.
pub fn aggregate(
    test_cases: &[TestCase],
    tokens: &[TrackingToken],
    resolution: &Resolution,
) -> EvaluationOutcome {
    let mut results = Vec::with_capacity(test_cases.len());
    let mut passed_tests = 0usize;

    for (idx, test_case) in test_cases.iter().enumerate() {
        let polled = tokens.get(idx).and_then(|token| resolution.get(token));

        let result = match polled {
            Some(polled) => CaseResult {
                test_case: test_case.clone(),
                status: polled.status,
                actual_output: polled.actual_output.clone(),
                error_output: polled.error_output.clone(),
            },
            None => CaseResult {
                test_case: test_case.clone(),
                status: SubmissionStatus::Unresolved,
                actual_output: None,
                error_output: None,
            },
        };

        if result.status.is_passed() {
            passed_tests += 1;
        }

        debug!(case = idx + 1, status = %result.status, "Case result");
        metrics::record_case_result(result.status.label());
        results.push(result);
    }

    let total_tests = results.len();
    let unresolved = results
        .iter()
        .filter(|r| r.status == SubmissionStatus::Unresolved)
        .count();

    let failure_reason = if resolution.timed_out {
        Some(format!(
            "evaluation deadline reached with {} of {} submissions unresolved",
            unresolved, total_tests
        ))
    } else if unresolved > 0 {
        Some(format!(
            "{} of {} submissions never reported a final status",
            unresolved, total_tests
        ))
    } else if total_tests > 0
        && results.iter().all(|r| r.status == SubmissionStatus::CompileError)
    {
        let compiler = results
            .iter()
            .find_map(|r| r.error_output.as_deref())
            .unwrap_or("no compiler output");
        Some(format!("compilation failed: {}", compiler.trim()))
    } else {
        None
    };

    info!(
        passed = passed_tests,
        total = total_tests,
        unresolved,
        "Aggregation complete"
    );

    EvaluationOutcome {
        total_tests,
        passed_tests,
        results,
        failure_reason,
        timed_out: resolution.timed_out || unresolved > 0,
    }
}
