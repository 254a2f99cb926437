//! Health probe for the monitored container
//!
//! Queries container status and recent logs and condenses them into a
//! [`HealthSnapshot`]. Every failure is folded into the snapshot; the probe
//! itself cannot fail.

use crate::adapters::DockerCli;
use crate::config::ProbeConfig;
use crate::domain::{ErrorType, HealthSnapshot};
use crate::supervisor::context;
use chrono::Utc;
use tracing::{debug, info, warn};

pub struct HealthProbe {
    docker: DockerCli,
    config: ProbeConfig,
}

impl HealthProbe {
    pub fn new(docker: DockerCli, config: ProbeConfig) -> Self {
        Self { docker, config }
    }

    pub async fn probe(&self) -> HealthSnapshot {
        let service = self.docker.container().to_string();
        let limit = self.config.query_timeout();

        let status_text = match self.docker.status(limit).await {
            Ok(status) => status,
            Err(e) => {
                warn!("Failed to check container {}: {}", service, e);
                return HealthSnapshot::query_failed(&service, &e.to_string());
            }
        };
        let running = !status_text.is_empty();
        debug!("Container {} status: {:?}", service, status_text);

        let mut snapshot = HealthSnapshot {
            service,
            running,
            status_text,
            recent_log: String::new(),
            error_detected: false,
            error_context: None,
            error_type: ErrorType::None,
            checked_at: Utc::now(),
        };

        let log = match self.docker.logs(self.config.log_tail_lines, limit).await {
            Ok(log) => log,
            Err(e) => {
                warn!("Failed to get logs for {}: {}", snapshot.service, e);
                snapshot.error_context = Some(format!("Failed to get logs: {}", e));
                return snapshot;
            }
        };

        if log.trim().is_empty() {
            return snapshot;
        }

        if context::detect(&log, self.config.detection) {
            snapshot.error_detected = true;
            if context::has_traceback(&log) {
                snapshot.error_type = ErrorType::RuntimeException;
                snapshot.error_context =
                    Some(context::extract_traceback(&log, self.config.traceback_lines));
            } else {
                snapshot.error_type = ErrorType::Unknown;
                snapshot.error_context =
                    Some(context::extract_marker_windows(&log, self.config.marker_lines));
            }
            info!(
                "Anomaly detected in {} ({})",
                snapshot.service, snapshot.error_type
            );
        }

        snapshot.recent_log = log;
        snapshot
    }
}
