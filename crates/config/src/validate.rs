//! Semantic validation of a parsed configuration.
//!
//! Catches values that parse fine but cannot work at runtime: empty bot
//! tokens, zero timeouts, accounts without a tenant.

use secrecy::ExposeSecret;

use crate::schema::AttendoConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "missing-value", "range", "noop"
    pub category: &'static str,
    /// Dotted path, e.g. "channels.telegram.support.token"
    pub path: String,
    pub message: String,
}

/// Result of validating a configuration.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

/// Validate a parsed config.
#[must_use]
pub fn validate(config: &AttendoConfig) -> ValidationResult {
    let mut diagnostics = Vec::new();

    let mut push = |severity, category, path: String, message: String| {
        diagnostics.push(Diagnostic {
            severity,
            category,
            path,
            message,
        });
    };

    for (account_id, account) in &config.channels.telegram {
        if account.token.expose_secret().is_empty() {
            push(
                Severity::Error,
                "missing-value",
                format!("channels.telegram.{account_id}.token"),
                "telegram account has an empty bot token".into(),
            );
        }
        if account.tenant_id.is_empty() {
            push(
                Severity::Error,
                "missing-value",
                format!("channels.telegram.{account_id}.tenant_id"),
                "telegram account is not bound to a tenant".into(),
            );
        }
    }

    if config.delivery.send_timeout_secs == 0 {
        push(
            Severity::Error,
            "range",
            "delivery.send_timeout_secs".into(),
            "send timeout must be positive".into(),
        );
    }

    if config.delivery.retry.enabled && config.delivery.retry.max_attempts == 0 {
        push(
            Severity::Warning,
            "noop",
            "delivery.retry.max_attempts".into(),
            "retry is enabled but max_attempts is 0, no retries will run".into(),
        );
    }

    if config.presence.typing_ttl_secs == 0 {
        push(
            Severity::Warning,
            "range",
            "presence.typing_ttl_secs".into(),
            "typing signals will expire immediately".into(),
        );
    }

    if config.evaluation.enabled && config.evaluation.survey_text.trim().is_empty() {
        push(
            Severity::Warning,
            "missing-value",
            "evaluation.survey_text".into(),
            "evaluation is enabled but the survey text is empty".into(),
        );
    }

    if config.server.port == 0 {
        push(
            Severity::Info,
            "range",
            "server.port".into(),
            "port 0 lets the OS pick an ephemeral port".into(),
        );
    }

    ValidationResult { diagnostics }
}
