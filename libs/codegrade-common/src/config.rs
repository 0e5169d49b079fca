use std::env;
use std::time::Duration;

/// Application configuration
/// Provides defaults with environment variable overrides
#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    pub judge_url: String,
    pub judge_api_key: Option<String>,
    pub judge_api_host: Option<String>,
    pub llm_url: String,
    pub llm_model: String,
    pub poll_interval_ms: u64,
    pub evaluation_deadline_ms: u64,
    pub max_poll_retries: u32,
    pub max_concurrent_polls: usize,
    pub http_timeout_ms: u64,
    pub report_ttl_seconds: u64,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            judge_url: env::var("JUDGE_URL")
                .unwrap_or_else(|_| "https://judge0-ce.p.rapidapi.com".to_string()),
            judge_api_key: non_empty_var("JUDGE_API_KEY"),
            judge_api_host: non_empty_var("JUDGE_API_HOST"),
            llm_url: env::var("LLM_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            llm_model: env::var("LLM_MODEL").unwrap_or_else(|_| "llama3".to_string()),
            poll_interval_ms: parsed_var("POLL_INTERVAL_MS").unwrap_or(1000),
            evaluation_deadline_ms: parsed_var("EVALUATION_DEADLINE_MS").unwrap_or(30000),
            max_poll_retries: parsed_var("MAX_POLL_RETRIES").unwrap_or(3),
            max_concurrent_polls: parsed_var("MAX_CONCURRENT_POLLS")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(10),
            http_timeout_ms: parsed_var("HTTP_TIMEOUT_MS").unwrap_or(10000),
            report_ttl_seconds: parsed_var("REPORT_TTL_SECONDS").unwrap_or(86400),
            port: parsed_var("PORT").unwrap_or(3000),
        }
    }

    pub fn new() -> Self {
        Self::from_env()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn evaluation_deadline(&self) -> Duration {
        Duration::from_millis(self.evaluation_deadline_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
