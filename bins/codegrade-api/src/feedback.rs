/// Feedback Requester
///
/// Builds an evaluation prompt, sends it to the text-generation collaborator
/// and extracts a `StructuredFeedback` JSON object from the reply.
///
/// Two prompt variants:
/// - `with_tests`: embeds the pass count ("3/5") and per-case statuses
/// - `quality_only`: used when the question has no test cases; it never
///   mentions pass/fail results

use codegrade_common::types::{EvaluationOutcome, Question, StructuredFeedback};
use handlebars::Handlebars;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::error::EvaluateError;
use crate::llm::TextGenerator;

const WITH_TESTS_TEMPLATE: &str = r#"You are an expert programming interviewer reviewing a candidate's solution.

Question: {{title}}
{{description}}

Language: {{language}}

Submitted code:
```
{{code}}
```

Test results: {{summary}} test cases passed.
{{#each cases}}
- Case {{this.number}}: {{this.status}}{{#if this.detail}} ({{this.detail}}){{/if}}
{{/each}}
{{#if failure_reason}}
Note: {{failure_reason}}
{{/if}}

Evaluate correctness using the results above, then time and space complexity, code quality, and better alternative approaches.
Respond with a single JSON object and nothing else:
{"score": <integer 0-100>, "correctness": "<text>", "complexity": "<text>", "quality": "<text>", "alternatives": ["<text>"]}
"#;

const QUALITY_ONLY_TEMPLATE: &str = r#"You are an expert programming interviewer reviewing a candidate's solution.

Question: {{title}}
{{description}}

Language: {{language}}

Submitted code:
```
{{code}}
```

No executable checks exist for this question. Judge the code by reading it: whether its logic solves the question, its time and space complexity, its code quality, and better alternative approaches.
Respond with a single JSON object and nothing else:
{"score": <integer 0-100>, "correctness": "<text>", "complexity": "<text>", "quality": "<text>", "alternatives": ["<text>"]}
"#;

const DETAIL_LIMIT: usize = 200;

pub struct FeedbackRequester {
    generator: Arc<dyn TextGenerator>,
    templates: Handlebars<'static>,
}

impl FeedbackRequester {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Result<Self, handlebars::TemplateError> {
        let mut templates = Handlebars::new();
        templates.set_strict_mode(true);
        // Prompts are plain text; source code must reach the model verbatim
        templates.register_escape_fn(handlebars::no_escape);
        templates.register_template_string("with_tests", WITH_TESTS_TEMPLATE)?;
        templates.register_template_string("quality_only", QUALITY_ONLY_TEMPLATE)?;

        Ok(Self {
            generator,
            templates,
        })
    }

    /// Render the prompt for an outcome
    pub fn build_prompt(
        &self,
        question: &Question,
        code: &str,
        language: &str,
        outcome: &EvaluationOutcome,
    ) -> Result<String, EvaluateError> {
        if !outcome.has_tests() {
            let data = json!({
                "title": question.title,
                "description": question.description,
                "language": language,
                "code": code,
            });
            return Ok(self.templates.render("quality_only", &data)?);
        }

        let cases: Vec<_> = outcome
            .results
            .iter()
            .enumerate()
            .map(|(idx, result)| {
                let detail = if result.status.is_passed() {
                    None
                } else {
                    Some(format!(
                        "input: {:?}, expected: {:?}, got: {:?}",
                        truncate(&result.test_case.input),
                        truncate(&result.test_case.expected_output),
                        truncate(result.actual_output.as_deref().unwrap_or("")),
                    ))
                };
                json!({
                    "number": idx + 1,
                    "status": result.status.label(),
                    "detail": detail,
                })
            })
            .collect();

        let data = json!({
            "title": question.title,
            "description": question.description,
            "language": language,
            "code": code,
            "summary": outcome.summary(),
            "cases": cases,
            "failure_reason": outcome.failure_reason,
        });
        Ok(self.templates.render("with_tests", &data)?)
    }

    /// Ask the collaborator for feedback and extract the JSON payload
    #[instrument(skip_all, fields(total = outcome.total_tests, passed = outcome.passed_tests))]
    pub async fn request_feedback(
        &self,
        question: &Question,
        code: &str,
        language: &str,
        outcome: &EvaluationOutcome,
    ) -> Result<StructuredFeedback, EvaluateError> {
        let prompt = self.build_prompt(question, code, language, outcome)?;
        debug!(prompt_len = prompt.len(), quality_only = !outcome.has_tests(), "Requesting feedback");

        let reply = self.generator.complete(&prompt).await?;

        extract_json(&reply).map_err(|e| {
            warn!(error = %e, reply_len = reply.len(), "Feedback reply could not be parsed");
            e
        })
    }
}

/// Parse the text between the first `{` and the last `}` as feedback JSON
pub fn extract_json(text: &str) -> Result<StructuredFeedback, EvaluateError> {
    let (start, end) = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => (start, end),
        _ => {
            return Err(EvaluateError::FeedbackParseFailure(
                "reply contains no JSON object".to_string(),
            ))
        }
    };

    serde_json::from_str(&text[start..=end])
        .map_err(|e| EvaluateError::FeedbackParseFailure(e.to_string()))
}

fn truncate(s: &str) -> String {
    if s.chars().count() <= DETAIL_LIMIT {
        return s.to_string();
    }
    let mut cut: String = s.chars().take(DETAIL_LIMIT).collect();
    cut.push('…');
    cut
}
