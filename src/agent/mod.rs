//! Diagnosis through an external reasoning oracle
//!
//! The oracle is either the HTTPS Messages API or the local `claude` CLI.
//! Its answers are treated as untrusted and validated into typed plans.

pub mod client;
pub mod diagnosis;
pub mod oracle;
pub mod prompt;

pub use client::CliOracle;
pub use diagnosis::{extract_json_object, parse_plan, DiagnosisClient};
pub use oracle::{build_oracle, ApiOracle, Oracle};
pub use prompt::build_prompt;
