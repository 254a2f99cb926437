use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classification of the anomaly found in the service's logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    #[default]
    None,
    RuntimeException,
    Unknown,
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorType::None => write!(f, "none"),
            ErrorType::RuntimeException => write!(f, "runtime_exception"),
            ErrorType::Unknown => write!(f, "unknown"),
        }
    }
}

/// Point-in-time view of the monitored service, built once per pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub service: String,
    pub running: bool,
    pub status_text: String,
    /// Bounded tail of combined stdout/stderr
    pub recent_log: String,
    pub error_detected: bool,
    pub error_context: Option<String>,
    pub error_type: ErrorType,
    pub checked_at: DateTime<Utc>,
}

impl HealthSnapshot {
    /// Snapshot for a service whose status could not be queried at all
    pub fn query_failed(service: &str, reason: &str) -> Self {
        Self {
            service: service.to_string(),
            running: false,
            status_text: String::new(),
            recent_log: String::new(),
            error_detected: true,
            error_context: Some(format!("Failed to check container: {}", reason)),
            error_type: ErrorType::Unknown,
            checked_at: Utc::now(),
        }
    }

    /// Running with nothing suspicious in the logs
    pub fn is_healthy(&self) -> bool {
        self.running && !self.error_detected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_failed_is_unhealthy() {
        let snap = HealthSnapshot::query_failed("svc", "docker not found");
        assert!(!snap.is_healthy());
        assert!(snap.error_detected);
        assert_eq!(snap.error_type, ErrorType::Unknown);
        assert!(snap
            .error_context
            .as_deref()
            .unwrap()
            .contains("docker not found"));
    }

    #[test]
    fn test_error_type_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorType::RuntimeException).unwrap();
        assert_eq!(json, "\"runtime_exception\"");
    }
}
