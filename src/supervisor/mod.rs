//! Supervision of the monitored service
//!
//! - `probe` / `context`: health snapshot and error-context extraction
//! - `executor`: applies remediation plans
//! - `alert`: notification formatting and best-effort delivery
//! - `healer`: one full remediation pass

pub mod alert;
pub mod context;
pub mod executor;
pub mod healer;
pub mod probe;

pub use alert::{Alert, AlertLevel, NotificationSink, Notifier};
pub use executor::RemediationExecutor;
pub use healer::{Healer, PassOutcome};
pub use probe::HealthProbe;
