//! Scripted fakes for the subprocess, oracle and notifier seams
//!
//! Used by unit tests and by the integration tests under `tests/`.

use crate::adapters::{CommandLine, CommandOutput, CommandRunner};
use crate::agent::Oracle;
use crate::error::{HealError, Result};
use crate::supervisor::Notifier;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Reply {
    Output { code: i32, stdout: String, stderr: String },
    Timeout,
    SpawnError(String),
}

/// [`CommandRunner`] that answers from a list of prefix rules.
///
/// The first rule whose prefix matches the rendered command wins; anything
/// unmatched exits 0 with empty output. Every command is recorded.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Vec<(String, Reply)>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn rule(mut self, prefix: &str, reply: Reply) -> Self {
        self.rules.push((prefix.to_string(), reply));
        self
    }

    /// Exit 0 with the given streams
    pub fn on_output(self, prefix: &str, stdout: &str, stderr: &str) -> Self {
        self.rule(
            prefix,
            Reply::Output {
                code: 0,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            },
        )
    }

    pub fn on_fail(self, prefix: &str, code: i32, stderr: &str) -> Self {
        self.rule(
            prefix,
            Reply::Output {
                code,
                stdout: String::new(),
                stderr: stderr.to_string(),
            },
        )
    }

    pub fn on_timeout(self, prefix: &str) -> Self {
        self.rule(prefix, Reply::Timeout)
    }

    pub fn on_spawn_error(self, prefix: &str, reason: &str) -> Self {
        self.rule(prefix, Reply::SpawnError(reason.to_string()))
    }

    /// Rendered commands in the order they were run
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, command: &CommandLine, limit: Duration) -> Result<CommandOutput> {
        let rendered = command.to_string();
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(rendered.clone());
        }

        let reply = self
            .rules
            .iter()
            .find(|(prefix, _)| rendered.starts_with(prefix.as_str()))
            .map(|(_, reply)| reply.clone());

        match reply {
            None => Ok(CommandOutput {
                exit_code: Some(0),
                ..CommandOutput::default()
            }),
            Some(Reply::Output { code, stdout, stderr }) => Ok(CommandOutput {
                exit_code: Some(code),
                stdout,
                stderr,
            }),
            Some(Reply::Timeout) => Err(HealError::CommandTimeout {
                command: rendered,
                timeout_secs: limit.as_secs(),
            }),
            Some(Reply::SpawnError(reason)) => Err(HealError::CommandSpawn {
                command: rendered,
                reason,
            }),
        }
    }
}

/// [`Oracle`] that always gives the same answer and counts the questions
#[derive(Debug)]
pub struct ScriptedOracle {
    response: std::result::Result<String, String>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedOracle {
    pub fn answering(response: &str) -> Self {
        Self {
            response: Ok(response.to_string()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            response: Err(reason.to_string()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        self.response.clone().map_err(HealError::Oracle)
    }
}

/// [`Notifier`] that keeps every message it was asked to send
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(text.to_string());
        }
        Ok(())
    }
}
