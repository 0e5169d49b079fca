use crate::types::EvaluationReport;
use redis::{AsyncCommands, RedisResult};

/// Redis key semantics for evaluation reports
/// Keeps the API and the CLI agreeing on where a report lives

pub const REPORT_PREFIX: &str = "codegrade:report";

/// Generate report key for an evaluation
pub fn report_key(evaluation_id: &uuid::Uuid) -> String {
    format!("{}:{}", REPORT_PREFIX, evaluation_id)
}

fn serialization_error(e: serde_json::Error) -> redis::RedisError {
    redis::RedisError::from((redis::ErrorKind::TypeError, "serialization error", e.to_string()))
}

/// Store an evaluation report with a TTL
pub async fn store_report(
    conn: &mut redis::aio::ConnectionManager,
    report: &EvaluationReport,
    ttl_seconds: u64,
) -> RedisResult<()> {
    let key = report_key(&report.evaluation_id);
    let payload = serde_json::to_string(report).map_err(serialization_error)?;

    let _: () = conn.set_ex(&key, payload, ttl_seconds).await?;
    Ok(())
}

/// Retrieve a stored evaluation report
pub async fn get_report(
    conn: &mut redis::aio::ConnectionManager,
    evaluation_id: &uuid::Uuid,
) -> RedisResult<Option<EvaluationReport>> {
    let key = report_key(evaluation_id);
    let payload: Option<String> = conn.get(&key).await?;

    match payload {
        Some(data) => {
            let report: EvaluationReport = serde_json::from_str(&data).map_err(|e| {
                redis::RedisError::from((
                    redis::ErrorKind::TypeError,
                    "deserialization error",
                    e.to_string(),
                ))
            })?;
            Ok(Some(report))
        }
        None => Ok(None),
    }
}
