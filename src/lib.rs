pub mod adapters;
pub mod agent;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod supervisor;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod workspace;

pub use agent::{DiagnosisClient, Oracle};
pub use config::AppConfig;
pub use domain::{ExecutionResult, HealthSnapshot, RemediationPlan};
pub use error::{HealError, Result};
pub use supervisor::{Healer, NotificationSink, PassOutcome, RemediationExecutor};
pub use workspace::SourceTree;
