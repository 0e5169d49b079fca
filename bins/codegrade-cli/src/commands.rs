// CLI commands for talking to the Codegrade API
use anyhow::{bail, Context, Result};
use codegrade_common::types::{
    CaseResult, EvaluationReport, EvaluationRequest, Language, Question, SubmissionStatus,
};
use std::fs;
use std::path::Path;

/// Load a question definition from a JSON file
fn load_question(path: &Path) -> Result<Question> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse question file {}", path.display()))
}

/// Turn a non-success API response into an error message
async fn api_error(response: reqwest::Response) -> anyhow::Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            let error = v.get("error")?.as_str()?.to_string();
            Some(match v.get("detail").and_then(|d| d.as_str()) {
                Some(detail) => format!("{} ({})", error, detail),
                None => error,
            })
        })
        .unwrap_or(body);
    anyhow::anyhow!("API returned {}: {}", status, detail)
}

/// Submit a solution for evaluation
pub async fn evaluate(
    api: &str,
    question_path: &str,
    code_path: &str,
    language: &str,
    json: bool,
) -> Result<()> {
    let question = load_question(Path::new(question_path))?;
    let code = fs::read_to_string(code_path)
        .with_context(|| format!("Failed to read {}", code_path))?;

    if code.trim().is_empty() {
        bail!("Source file {} is empty", code_path);
    }

    if Language::from_str(language).is_none() {
        println!(
            "⚠️  Unknown language '{}' - the service will run it as javascript",
            language
        );
    }

    println!(
        "🚀 Evaluating {} against '{}' ({} test cases)...",
        code_path,
        question.title,
        question.test_cases.len()
    );

    let request = EvaluationRequest {
        question,
        code,
        language: language.to_string(),
    };

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/evaluate", api.trim_end_matches('/')))
        .json(&request)
        .send()
        .await
        .with_context(|| format!("Failed to reach API at {}", api))?;

    if !response.status().is_success() {
        return Err(api_error(response).await);
    }

    let report: EvaluationReport = response
        .json()
        .await
        .context("Failed to parse evaluation report")?;

    print_report(&report, json)
}

/// Fetch a stored report by id
pub async fn show_report(api: &str, id: &uuid::Uuid, json: bool) -> Result<()> {
    let response = reqwest::get(format!("{}/evaluation/{}", api.trim_end_matches('/'), id))
        .await
        .with_context(|| format!("Failed to reach API at {}", api))?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
        bail!("Evaluation {} not found (reports expire after their TTL)", id);
    }
    if !response.status().is_success() {
        return Err(api_error(response).await);
    }

    let report: EvaluationReport = response
        .json()
        .await
        .context("Failed to parse evaluation report")?;

    print_report(&report, json)
}

/// List supported languages
pub fn list_languages() {
    println!("📋 Supported Languages:\n");
    println!("{:<12} {:<10}", "Name", "Judge ID");
    println!("{}", "─".repeat(24));

    for lang in Language::all_variants() {
        println!("{:<12} {:<10}", lang.to_string(), lang.judge_id());
    }

    println!("\n💡 Unrecognised names are evaluated as javascript.");
}

fn print_report(report: &EvaluationReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let outcome = &report.outcome;

    println!("\n📊 Evaluation {}", report.evaluation_id);
    println!("{}", "─".repeat(60));
    println!("Language:  {} (id {})", report.language, report.language_id);
    println!("Score:     {}/100", report.feedback.score);

    if outcome.has_tests() {
        println!("Tests:     {} passed", outcome.summary());
        for (idx, case) in outcome.results.iter().enumerate() {
            println!("  {}", case_line(idx, case));
        }
    } else {
        println!("Tests:     none (quality-only review)");
    }

    if let Some(reason) = &outcome.failure_reason {
        println!("⚠️  {}", reason);
    }

    println!("\n✅ Correctness\n  {}", report.feedback.correctness);
    println!("\n⏱️  Complexity\n  {}", report.feedback.complexity);
    println!("\n🧹 Quality\n  {}", report.feedback.quality);

    if !report.feedback.alternatives.is_empty() {
        println!("\n💡 Alternatives");
        for alt in &report.feedback.alternatives {
            println!("  - {}", alt);
        }
    }

    Ok(())
}

fn status_icon(status: SubmissionStatus) -> &'static str {
    match status {
        SubmissionStatus::Accepted => "✅",
        SubmissionStatus::Unresolved | SubmissionStatus::Queued | SubmissionStatus::Running => "⏳",
        _ => "❌",
    }
}

fn case_line(idx: usize, case: &CaseResult) -> String {
    let mut line = format!("{} Case {}: {}", status_icon(case.status), idx + 1, case.status);
    if !case.status.is_passed() {
        if let Some(actual) = &case.actual_output {
            line.push_str(&format!(
                " (expected {:?}, got {:?})",
                case.test_case.expected_output.trim(),
                actual.trim()
            ));
        }
    }
    line
}
