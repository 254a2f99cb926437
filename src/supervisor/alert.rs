//! Alerts and best-effort notification delivery
//!
//! Formats pass status as Telegram-flavoured HTML and hands it to a
//! [`Notifier`]. Delivery failures are logged and dropped; nothing here can
//! change the outcome of a pass.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Outbound message channel
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<()>;
}

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlertLevel {
    /// Healer engaged, work in progress
    Info,
    /// Remediation applied
    Success,
    /// Remediation failed, a human must look
    Error,
}

impl AlertLevel {
    /// Get emoji prefix for alert level
    pub fn emoji(&self) -> &'static str {
        match self {
            AlertLevel::Info => "\u{1f916}",    // robot
            AlertLevel::Success => "\u{2705}", // check mark
            AlertLevel::Error => "\u{274c}",   // red X
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Info => "info",
            AlertLevel::Success => "success",
            AlertLevel::Error => "error",
        }
    }
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Alert payload
#[derive(Debug, Clone)]
pub struct Alert {
    pub level: AlertLevel,
    pub title: String,
    /// `(label, value)` rows rendered as `<b>label:</b> value`
    pub fields: Vec<(String, String)>,
    pub footer: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(level: AlertLevel, title: &str) -> Self {
        Self {
            level,
            title: title.to_string(),
            fields: Vec::new(),
            footer: None,
            timestamp: Utc::now(),
        }
    }

    pub fn field(mut self, label: &str, value: impl Into<String>) -> Self {
        self.fields.push((label.to_string(), value.into()));
        self
    }

    pub fn footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }

    /// Render with bold tags and line breaks
    pub fn format_html(&self) -> String {
        let mut text = format!(
            "{} <b>{}</b>\n",
            self.level.emoji(),
            escape_html(&self.title)
        );
        if !self.fields.is_empty() {
            text.push('\n');
        }
        for (label, value) in &self.fields {
            text.push_str(&format!(
                "<b>{}:</b> {}\n",
                escape_html(label),
                escape_html(value)
            ));
        }
        if let Some(footer) = &self.footer {
            text.push('\n');
            text.push_str(&escape_html(footer));
            text.push('\n');
        }
        text.push_str(&format!(
            "\n<i>{}</i>",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        text
    }
}

/// Escape the characters Telegram's HTML parse mode treats as markup
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Fire-and-forget delivery of alerts
#[derive(Clone, Default)]
pub struct NotificationSink {
    notifier: Option<Arc<dyn Notifier>>,
}

impl NotificationSink {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier: Some(notifier),
        }
    }

    /// Sink that only logs
    pub fn disabled() -> Self {
        Self { notifier: None }
    }

    /// Log the alert and try to deliver it; errors are swallowed
    pub async fn notify(&self, alert: &Alert) {
        match alert.level {
            AlertLevel::Info | AlertLevel::Success => info!("[{}] {}", alert.level, alert.title),
            AlertLevel::Error => error!("[{}] {}", alert.level, alert.title),
        }

        let Some(notifier) = &self.notifier else {
            debug!("Notifications disabled, not sending '{}'", alert.title);
            return;
        };

        if let Err(e) = notifier.send(&alert.format_html()).await {
            warn!("Failed to send notification '{}': {}", alert.title, e);
        }
    }
}
