/// Submission Builder
///
/// Turns (source code, language id, test cases) into one submission per
/// test case, in test-case order. All submissions share the same code and
/// language id.

use codegrade_common::types::{Submission, TestCase};

/// Build the batch for one evaluation request
///
/// An empty `test_cases` slice yields an empty batch. That means "nothing to
/// execute", not an error; the caller switches to quality-only feedback.
pub fn build_submissions(code: &str, language_id: u32, test_cases: &[TestCase]) -> Vec<Submission> {
    test_cases
        .iter()
        .map(|tc| Submission {
            source_code: code.to_string(),
            language_id,
            stdin: tc.input.clone(),
            expected_output: tc.expected_output.clone(),
        })
        .collect()
}
