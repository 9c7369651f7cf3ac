//! Config schema types (server, storage, channels, delivery, presence,
//! evaluation defaults).

use std::{collections::HashMap, path::PathBuf};

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AttendoConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub channels: ChannelsConfig,
    pub delivery: DeliveryConfig,
    pub presence: PresenceConfig,
    pub evaluation: EvaluationDefaults,
}

/// Gateway server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to. Defaults to "127.0.0.1".
    pub bind: String,
    /// Port to listen on. 0 lets the OS pick one.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8820,
        }
    }
}

/// Where the engine database lives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file. `None` resolves to `attendo.db` under the
    /// user data directory.
    pub path: Option<String>,
}

impl StorageConfig {
    /// Effective database path.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        match &self.path {
            Some(p) => PathBuf::from(p),
            None => crate::loader::data_dir().join("attendo.db"),
        }
    }
}

/// Channel account configuration, keyed by account id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    pub telegram: HashMap<String, TelegramAccountConfig>,
    pub widget: WidgetConfig,
}

/// One Telegram bot account. Each account serves exactly one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramAccountConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub tenant_id: String,
    /// Bot API token. Supports `${ENV_VAR}` substitution.
    #[serde(serialize_with = "serialize_secret")]
    pub token: Secret<String>,
}

/// Embedded web-widget transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetConfig {
    pub enabled: bool,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Outbound delivery behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Upper bound on a single provider send call. A call that exceeds this
    /// fails the delivery instead of leaving it in `sending` forever.
    pub send_timeout_secs: u64,
    pub retry: RetryConfig,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            send_timeout_secs: 30,
            retry: RetryConfig::default(),
        }
    }
}

/// Bounded retry for transient transport failures. Disabled by default: the
/// base behavior is that the first failure is terminal and the agent decides
/// whether to resend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub enabled: bool,
    pub max_attempts: u32,
    /// Delay before the first retry; doubles per attempt.
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_attempts: 3,
            backoff_ms: 500,
        }
    }
}

/// Presence and typing behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Seconds a typing signal stays visible without renewal.
    pub typing_ttl_secs: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self { typing_ttl_secs: 5 }
    }
}

/// Fallback evaluation settings for tenants without an explicit settings row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationDefaults {
    pub enabled: bool,
    pub send_on_close: bool,
    pub survey_text: String,
}

impl Default for EvaluationDefaults {
    fn default() -> Self {
        Self {
            enabled: false,
            send_on_close: true,
            survey_text: "How would you rate the support you received? \
                          Reply with a number from 1 (poor) to 5 (great)."
                .into(),
        }
    }
}

fn default_true() -> bool {
    true
}

// ── Serde helpers for Secret<String> ────────────────────────────────────────

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = AttendoConfig::default();
        assert_eq!(cfg.server.bind, "127.0.0.1");
        assert_eq!(cfg.server.port, 8820);
        assert_eq!(cfg.delivery.send_timeout_secs, 30);
        assert!(!cfg.delivery.retry.enabled);
        assert_eq!(cfg.presence.typing_ttl_secs, 5);
        assert!(!cfg.evaluation.enabled);
        assert!(cfg.channels.widget.enabled);
        assert!(cfg.channels.telegram.is_empty());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: AttendoConfig = toml::from_str(
            r#"
            [server]
            port = 9000

            [channels.telegram.support]
            tenant_id = "acme"
            token = "123:abc"

            [delivery.retry]
            enabled = true
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.server.bind, "127.0.0.1");
        let account = cfg.channels.telegram.get("support").unwrap();
        assert!(account.enabled);
        assert_eq!(account.tenant_id, "acme");
        assert_eq!(account.token.expose_secret(), "123:abc");
        assert!(cfg.delivery.retry.enabled);
        assert_eq!(cfg.delivery.retry.max_attempts, 3);
    }

    #[test]
    fn config_round_trips_through_toml() {
        let mut cfg = AttendoConfig::default();
        cfg.channels.telegram.insert(
            "main".into(),
            TelegramAccountConfig {
                enabled: false,
                tenant_id: "t1".into(),
                token: Secret::new("tok".into()),
            },
        );
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let back: AttendoConfig = toml::from_str(&toml_str).unwrap();
        let account = back.channels.telegram.get("main").unwrap();
        assert!(!account.enabled);
        assert_eq!(account.token.expose_secret(), "tok");
    }

    #[test]
    fn storage_path_override() {
        let cfg: AttendoConfig = toml::from_str("[storage]\npath = \"/tmp/test.db\"").unwrap();
        assert_eq!(cfg.storage.database_path(), PathBuf::from("/tmp/test.db"));
    }
}
