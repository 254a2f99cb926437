//! One remediation pass: probe, diagnose, execute, report
//!
//! A pass keeps no state after it returns. Exactly one plan is requested
//! and one execution attempt is made; nothing is retried within a pass.

use crate::agent::DiagnosisClient;
use crate::domain::{
    ExecutionResult, GitOutcome, HealthSnapshot, RemediationAction, RemediationPlan,
};
use crate::supervisor::alert::{Alert, AlertLevel, NotificationSink};
use crate::supervisor::executor::RemediationExecutor;
use crate::supervisor::probe::HealthProbe;
use crate::workspace::SourceTree;
use std::collections::BTreeMap;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Longest error text carried in a failure notification
const MAX_REPORTED_ERROR_CHARS: usize = 500;

/// How a pass ended
#[derive(Debug, Clone, PartialEq)]
pub enum PassOutcome {
    /// Nothing to do
    Healthy(HealthSnapshot),
    Remediated {
        plan: RemediationPlan,
        result: ExecutionResult,
    },
    Failed {
        plan: RemediationPlan,
        result: ExecutionResult,
    },
}

impl PassOutcome {
    pub fn is_healthy(&self) -> bool {
        matches!(self, PassOutcome::Healthy(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            PassOutcome::Healthy(_) => "healthy",
            PassOutcome::Remediated { .. } => "remediated",
            PassOutcome::Failed { .. } => "failed",
        }
    }
}

pub struct Healer {
    probe: HealthProbe,
    diagnosis: DiagnosisClient,
    executor: RemediationExecutor,
    sources: SourceTree,
    sink: NotificationSink,
}

impl Healer {
    pub fn new(
        probe: HealthProbe,
        diagnosis: DiagnosisClient,
        executor: RemediationExecutor,
        sources: SourceTree,
        sink: NotificationSink,
    ) -> Self {
        Self {
            probe,
            diagnosis,
            executor,
            sources,
            sink,
        }
    }

    /// Probe only, no side effects
    pub async fn check(&self) -> HealthSnapshot {
        self.probe.probe().await
    }

    pub async fn run_once(&self) -> PassOutcome {
        let span = info_span!("pass", id = %Uuid::new_v4());
        self.pass().instrument(span).await
    }

    async fn pass(&self) -> PassOutcome {
        let snapshot = self.probe.probe().await;
        if snapshot.is_healthy() {
            info!("{} is healthy", snapshot.service);
            return PassOutcome::Healthy(snapshot);
        }

        warn!(
            "{} needs attention (running: {}, error: {})",
            snapshot.service, snapshot.running, snapshot.error_type
        );
        self.sink
            .notify(
                &Alert::new(AlertLevel::Info, "Autonomous Healer Activated")
                    .field("Container", snapshot.service.as_str())
                    .field("Status", if snapshot.running { "running" } else { "down" })
                    .footer("Analyzing error..."),
            )
            .await;

        let sources = if self.sources.is_enabled() {
            self.sources.read_all().await
        } else {
            BTreeMap::new()
        };

        let plan = self.diagnosis.diagnose(&snapshot, &sources).await;
        info!(
            "Plan: {} (confidence: {}, fallback: {})",
            plan.fix_type(),
            plan.confidence,
            plan.fallback
        );

        let result = self.executor.execute(&plan).await;

        if result.succeeded {
            self.sink.notify(&success_alert(&plan, &result)).await;
            PassOutcome::Remediated { plan, result }
        } else {
            self.sink.notify(&failure_alert(&plan, &result)).await;
            PassOutcome::Failed { plan, result }
        }
    }
}

fn success_alert(plan: &RemediationPlan, result: &ExecutionResult) -> Alert {
    let root_cause = plan.root_cause.as_deref().unwrap_or("Unknown");
    match &plan.action {
        RemediationAction::CodeEdit { commit_message, .. } => {
            Alert::new(AlertLevel::Success, "Code Fixed Autonomously")
                .field("Root Cause", root_cause)
                .field("Fix Applied", plan.fix_type().as_str())
                .field("Files Fixed", files_summary(result))
                .field("Commit", commit_summary(commit_message.as_deref(), result.git.as_ref()))
                .footer("Container rebuilt and restarted")
        }
        RemediationAction::Operational { .. } => {
            Alert::new(AlertLevel::Success, "Error Fixed Autonomously")
                .field("Issue", plan.error_analysis.as_str())
                .field("Root Cause", root_cause)
                .field("Fix Applied", plan.fix_type().as_str())
                .field("Commands Executed", result.executed_steps.len().to_string())
                .footer(plan.explanation.as_deref().unwrap_or(""))
        }
    }
}

fn failure_alert(plan: &RemediationPlan, result: &ExecutionResult) -> Alert {
    let stage = result
        .failed_stage
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let alert = Alert::new(AlertLevel::Error, "Auto-Fix Failed")
        .field("Issue", plan.error_analysis.as_str())
        .field("Attempted Fix", plan.fix_type().as_str())
        .field("Root Cause", plan.root_cause.as_deref().unwrap_or("Unknown"))
        .field("Failed At", stage);

    // Edited files stay on disk after a late failure
    let alert = match &plan.action {
        RemediationAction::CodeEdit { commit_message, .. } => alert
            .field("Files Changed", files_summary(result))
            .field("Commit", commit_summary(commit_message.as_deref(), result.git.as_ref())),
        RemediationAction::Operational { .. } => alert,
    };

    alert
        .field("Errors", result.error_summary(MAX_REPORTED_ERROR_CHARS))
        .footer("Manual intervention needed")
}

fn files_summary(result: &ExecutionResult) -> String {
    if result.files_edited.is_empty() {
        "none".to_string()
    } else {
        result.files_edited.join(", ")
    }
}

fn commit_summary(message: Option<&str>, git: Option<&GitOutcome>) -> String {
    let message = message.unwrap_or_default();
    match git {
        Some(GitOutcome::Committed { pushed: true }) => format!("{} (pushed)", message),
        Some(GitOutcome::Committed { pushed: false }) => {
            format!("{} (committed, not pushed)", message)
        }
        Some(GitOutcome::Failed { reason }) => format!("not committed: {}", reason),
        Some(GitOutcome::Skipped) => "not committed (no commit message)".to_string(),
        None => "not attempted".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{DockerCli, GitRepo};
    use crate::agent::oracle::MockOracle;
    use crate::config::{ExecutorConfig, ProbeConfig, ServiceConfig};
    use crate::supervisor::alert::MockNotifier;
    use crate::testing::ScriptedRunner;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    const TRACEBACK_LOG: &str = "Starting\nTraceback (most recent call last):\n  File \"main.py\", line 3, in <module>\n    v = d['x']\nKeyError: 'x'\n";

    fn healer(
        runner: ScriptedRunner,
        oracle: MockOracle,
        notifier: MockNotifier,
    ) -> (Healer, Arc<ScriptedRunner>) {
        let runner = Arc::new(runner);
        let service = ServiceConfig {
            name: "svc".to_string(),
            image: "svc:latest".to_string(),
            project_dir: PathBuf::from("/tmp"),
            source_files: vec![],
            volumes: vec![],
            restart_policy: "unless-stopped".to_string(),
        };
        let docker = DockerCli::new(runner.clone(), &service);
        let sources = SourceTree::new(service.project_dir.clone(), vec![]);
        let healer = Healer::new(
            HealthProbe::new(docker.clone(), ProbeConfig::default()),
            DiagnosisClient::new(Arc::new(oracle), &service.name, 5000),
            RemediationExecutor::new(
                runner.clone(),
                docker,
                GitRepo::new(runner.clone(), service.project_dir.clone(), true, Duration::from_secs(5)),
                sources.clone(),
                ExecutorConfig::default(),
            ),
            sources,
            NotificationSink::new(Arc::new(notifier)),
        );
        (healer, runner)
    }

    fn healthy_runner() -> ScriptedRunner {
        ScriptedRunner::new()
            .on_output("docker ps", "Up 3 hours\n", "")
            .on_output("docker logs", "Checking inbox\nNo new mail\n", "")
    }

    #[tokio::test]
    async fn test_healthy_pass_has_no_side_effects() {
        let mut oracle = MockOracle::new();
        oracle.expect_complete().times(0);
        let mut notifier = MockNotifier::new();
        notifier.expect_send().times(0);

        let (healer, runner) = healer(healthy_runner(), oracle, notifier);
        for _ in 0..2 {
            assert!(healer.run_once().await.is_healthy());
        }
        assert_eq!(
            runner.calls(),
            vec![
                "docker ps --filter name=svc --format {{.Status}}",
                "docker logs --tail 200 svc",
                "docker ps --filter name=svc --format {{.Status}}",
                "docker logs --tail 200 svc",
            ]
        );
    }

    #[tokio::test]
    async fn test_restart_scenario() {
        let runner = ScriptedRunner::new()
            .on_output("docker ps", "Up 3 hours\n", "")
            .on_output("docker logs", "", TRACEBACK_LOG);

        let mut oracle = MockOracle::new();
        oracle.expect_complete().times(1).returning(|_| {
            Ok(r#"{"fix_type": "docker_restart", "root_cause": "stale cache after reconnect", "docker_commands": ["restart svc"]}"#.to_string())
        });

        let mut notifier = MockNotifier::new();
        notifier
            .expect_send()
            .withf(|text: &str| text.contains("Autonomous Healer Activated"))
            .times(1)
            .returning(|_| Ok(()));
        notifier
            .expect_send()
            .withf(|text: &str| {
                text.contains("Error Fixed Autonomously") && text.contains("stale cache after reconnect")
            })
            .times(1)
            .returning(|_| Ok(()));

        let (healer, runner) = healer(runner, oracle, notifier);
        match healer.run_once().await {
            PassOutcome::Remediated { result, .. } => {
                assert_eq!(result.executed_steps, vec!["restart svc"]);
            }
            other => panic!("expected remediation, got {}", other.label()),
        }
        assert_eq!(runner.calls().last().map(String::as_str), Some("restart svc"));
    }

    #[tokio::test]
    async fn test_failed_command_reports_failure() {
        let runner = ScriptedRunner::new()
            .on_output("docker ps", "", "")
            .on_output("docker logs", "", "")
            .on_fail("docker restart", 1, "Error: No such container: svc");

        let mut oracle = MockOracle::new();
        oracle
            .expect_complete()
            .times(1)
            .returning(|_| Err(crate::error::HealError::Oracle("timed out".to_string())));

        let mut notifier = MockNotifier::new();
        notifier
            .expect_send()
            .withf(|text: &str| text.contains("Autonomous Healer Activated"))
            .times(1)
            .returning(|_| Ok(()));
        notifier
            .expect_send()
            .withf(|text: &str| text.contains("Auto-Fix Failed") && text.contains("No such container"))
            .times(1)
            .returning(|_| Ok(()));

        let (healer, _) = healer(runner, oracle, notifier);
        match healer.run_once().await {
            PassOutcome::Failed { plan, result } => {
                assert!(plan.fallback);
                assert_eq!(result.executed_steps, vec!["docker restart svc"]);
            }
            other => panic!("expected failure, got {}", other.label()),
        }
    }

    #[tokio::test]
    async fn test_notification_errors_do_not_change_outcome() {
        let runner = ScriptedRunner::new()
            .on_output("docker ps", "Up\n", "")
            .on_output("docker logs", "CRITICAL: disk full\n", "");

        let mut oracle = MockOracle::new();
        oracle
            .expect_complete()
            .returning(|_| Ok(r#"{"fix_type": "other", "commands": ["echo cleanup"]}"#.to_string()));

        let mut notifier = MockNotifier::new();
        notifier
            .expect_send()
            .times(2)
            .returning(|_| Err(crate::error::HealError::Notification("401 Unauthorized".to_string())));

        let (healer, _) = healer(runner, oracle, notifier);
        assert_eq!(healer.run_once().await.label(), "remediated");
    }

    #[test]
    fn test_failure_alert_bounds_errors() {
        let plan = RemediationPlan::safe_default("svc", "Oracle error: down");
        let result = ExecutionResult::default()
            .fail(crate::domain::FailedStage::Commands, "x".repeat(2000));
        let text = failure_alert(&plan, &result).format_html();
        assert!(text.contains(&"x".repeat(500)));
        assert!(!text.contains(&"x".repeat(501)));
        assert!(text.contains("<b>Failed At:</b> commands"));
        assert!(text.contains("Manual intervention needed"));
    }

    #[test]
    fn test_success_alert_reports_unpushed_commit() {
        let plan = RemediationPlan {
            error_analysis: "KeyError on startup".to_string(),
            root_cause: Some("missing key".to_string()),
            confidence: crate::domain::Confidence::High,
            explanation: None,
            testing_steps: vec![],
            action: RemediationAction::CodeEdit {
                files: vec![],
                commit_message: Some("Fix: default the key".to_string()),
            },
            fallback: false,
        };
        let mut result = ExecutionResult::default().succeed();
        result.files_edited = vec!["main.py".to_string()];
        result.git = Some(GitOutcome::Committed { pushed: false });

        let text = success_alert(&plan, &result).format_html();
        assert!(text.contains("<b>Fix Applied:</b> code_edit"));
        assert!(text.contains("<b>Files Fixed:</b> main.py"));
        assert!(text.contains("Fix: default the key (committed, not pushed)"));
    }
}
