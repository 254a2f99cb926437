//! Diagnosis client
//!
//! Turns a health snapshot into a validated [`RemediationPlan`]. The oracle
//! is untrusted: its answer is located, parsed and validated, and anything
//! that goes wrong along the way yields the safe-default restart plan.

use crate::agent::oracle::Oracle;
use crate::agent::prompt::build_prompt;
use crate::domain::{HealthSnapshot, RawPlan, RemediationPlan};
use crate::error::{HealError, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct DiagnosisClient {
    oracle: Arc<dyn Oracle>,
    service: String,
    log_excerpt_chars: usize,
}

impl DiagnosisClient {
    pub fn new(oracle: Arc<dyn Oracle>, service: &str, log_excerpt_chars: usize) -> Self {
        Self {
            oracle,
            service: service.to_string(),
            log_excerpt_chars,
        }
    }

    /// Always returns a usable plan
    pub async fn diagnose(
        &self,
        snapshot: &HealthSnapshot,
        sources: &BTreeMap<String, String>,
    ) -> RemediationPlan {
        let prompt = build_prompt(snapshot, sources, self.log_excerpt_chars);
        debug!("Diagnosis prompt: {} chars, {} source files", prompt.len(), sources.len());

        let response = match self.oracle.complete(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Oracle unavailable, using safe default: {}", e);
                return RemediationPlan::safe_default(&self.service, &e.to_string());
            }
        };

        match parse_plan(&response) {
            Ok(plan) => {
                info!(
                    "Oracle proposed {} (confidence: {})",
                    plan.fix_type(),
                    plan.confidence
                );
                plan
            }
            Err(e) => {
                warn!("Unusable oracle response, using safe default: {}", e);
                RemediationPlan::safe_default(
                    &self.service,
                    &format!("Could not parse oracle response: {}", e),
                )
            }
        }
    }
}

/// Locate, parse and validate the plan inside a free-text answer
pub fn parse_plan(response: &str) -> Result<RemediationPlan> {
    let json = extract_json_object(response)
        .ok_or_else(|| HealError::InvalidPlan("no JSON object in response".to_string()))?;
    let raw: RawPlan = serde_json::from_str(json)?;
    RemediationPlan::try_from(raw)
}

/// First balanced `{...}` span that parses as a JSON object.
///
/// Braces inside string literals are ignored, so prose before or after the
/// payload (including markdown fences) does not confuse the scan.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let mut search_from = 0;

    while let Some(offset) = text[search_from..].find('{') {
        let start = search_from + offset;
        if let Some(end) = balanced_end(&text[start..]) {
            let candidate = &text[start..start + end];
            if matches!(
                serde_json::from_str::<serde_json::Value>(candidate),
                Ok(serde_json::Value::Object(_))
            ) {
                return Some(candidate);
            }
        }
        search_from = start + 1;
    }

    None
}

/// Byte length of the object starting at `text[0] == '{'`
fn balanced_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(idx + 1);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::oracle::MockOracle;
    use crate::domain::{Confidence, ErrorType, FixType};
    use chrono::Utc;

    fn snapshot() -> HealthSnapshot {
        HealthSnapshot {
            service: "svc".to_string(),
            running: true,
            status_text: "Up".to_string(),
            recent_log: "Traceback ... KeyError: 'x'".to_string(),
            error_detected: true,
            error_context: Some("Traceback ... KeyError: 'x'".to_string()),
            error_type: ErrorType::RuntimeException,
            checked_at: Utc::now(),
        }
    }

    fn client_returning(response: Result<String>) -> DiagnosisClient {
        let mut oracle = MockOracle::new();
        let mut response = Some(response);
        oracle
            .expect_complete()
            .times(1)
            .returning(move |_| response.take().unwrap());
        DiagnosisClient::new(Arc::new(oracle), "svc", 5000)
    }

    fn assert_safe_default(plan: &RemediationPlan) {
        assert!(plan.fallback);
        assert_eq!(plan.fix_type(), FixType::Restart);
        assert_eq!(plan.commands(), &["docker restart svc".to_string()]);
        assert_eq!(plan.confidence, Confidence::Low);
    }

    #[test]
    fn test_extract_json_with_prose() {
        let text = "Here's my analysis:\n```json\n{\"a\": \"}\", \"b\": {\"c\": 1}}\n```\nDone {";
        assert_eq!(extract_json_object(text), Some("{\"a\": \"}\", \"b\": {\"c\": 1}}"));
    }

    #[test]
    fn test_extract_skips_non_json_braces() {
        let text = "Use {placeholder} syntax. {\"fix_type\": \"restart\"}";
        assert_eq!(extract_json_object(text), Some("{\"fix_type\": \"restart\"}"));
    }

    #[test]
    fn test_extract_handles_escaped_quotes() {
        let text = r#"{"old_code": "print(\"}\")"}"#;
        assert_eq!(extract_json_object(text), Some(text));
    }

    #[test]
    fn test_extract_none() {
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("{ unterminated"), None);
    }

    #[tokio::test]
    async fn test_docker_restart_scenario() {
        let client = client_returning(Ok(
            "Analysis follows.\n{\"fix_type\": \"docker_restart\", \"root_cause\": \"transient KeyError\", \"docker_commands\": [\"restart svc\"]}"
                .to_string(),
        ));
        let plan = client.diagnose(&snapshot(), &BTreeMap::new()).await;
        assert!(!plan.fallback);
        assert_eq!(plan.fix_type(), FixType::Restart);
        assert_eq!(plan.commands(), &["restart svc".to_string()]);
    }

    #[tokio::test]
    async fn test_unparsable_response_falls_back() {
        let client = client_returning(Ok("I think you should restart it.".to_string()));
        let plan = client.diagnose(&snapshot(), &BTreeMap::new()).await;
        assert_safe_default(&plan);
        assert!(plan.error_analysis.starts_with("Could not parse"));
    }

    #[tokio::test]
    async fn test_schema_violation_falls_back() {
        let client = client_returning(Ok("{\"fix_type\": \"format_disk\", \"commands\": [\"mkfs\"]}".to_string()));
        assert_safe_default(&client.diagnose(&snapshot(), &BTreeMap::new()).await);
    }

    #[tokio::test]
    async fn test_oracle_failure_falls_back() {
        let client = client_returning(Err(HealError::Oracle("connection refused".to_string())));
        let plan = client.diagnose(&snapshot(), &BTreeMap::new()).await;
        assert_safe_default(&plan);
        assert!(plan.error_analysis.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_prompt_carries_sources() {
        let mut oracle = MockOracle::new();
        oracle
            .expect_complete()
            .withf(|prompt: &str| prompt.contains("CURRENT SOURCE CODE - main.py"))
            .times(1)
            .returning(|_| Ok("{\"fix_type\": \"restart\", \"commands\": [\"docker restart svc\"]}".to_string()));
        let client = DiagnosisClient::new(Arc::new(oracle), "svc", 5000);

        let mut sources = BTreeMap::new();
        sources.insert("main.py".to_string(), "x = 1".to_string());
        let plan = client.diagnose(&snapshot(), &sources).await;
        assert!(!plan.fallback);
    }
}
