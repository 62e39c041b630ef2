use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::routing::binding_matches;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// Key lookup used while building a [`Config`].
///
/// Tries `{PROFILE}_{KEY}` first when a profile is active, falls back to `{KEY}`.
/// Empty values count as unset.
struct Profiled<'a> {
    profile: &'a str,
    source: &'a dyn Fn(&str) -> Option<String>,
}

impl Profiled<'_> {
    fn raw(&self, key: &str) -> Option<String> {
        (self.source)(key).filter(|s| !s.is_empty())
    }

    fn opt(&self, key: &str) -> Option<String> {
        if !self.profile.is_empty() {
            let prefixed = format!("{}_{}", self.profile, key);
            if let Some(v) = self.raw(&prefixed) {
                return Some(v);
            }
        }
        self.raw(key)
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.opt(key).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T: FromStr>(&self, key: &str, default: T) -> T {
        match self.opt(key) {
            Some(v) => v.parse().unwrap_or_else(|_| {
                tracing::warn!(key, value = %v, "unparseable config value, using default");
                default
            }),
            None => default,
        }
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        match self.opt(key).map(|v| v.to_ascii_lowercase()) {
            Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
            Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
            _ => default,
        }
    }
}

// ── Top-level config ──────────────────────────────────────────

/// Immutable process configuration, read once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub service: ServiceConfig,
    pub server: ServerConfig,
    pub broker: BrokerConfig,
    pub worker: WorkerConfig,
    pub providers: ProviderConfig,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `HERALD_PROFILE`. When set (e.g. `PROD`), every key
    /// is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env::var("HERALD_PROFILE").unwrap_or_default();
        Self::for_profile(&profile)
    }

    /// Build config from the process environment for a specific named profile.
    pub fn for_profile(profile: &str) -> Self {
        Self::from_lookup(profile, |key| env::var(key).ok())
    }

    /// Build config from an arbitrary key source.
    pub fn from_lookup(profile: &str, source: impl Fn(&str) -> Option<String>) -> Self {
        let p = profile.to_uppercase();
        let env = Profiled {
            profile: &p,
            source: &source,
        };
        Self {
            profile: p.clone(),
            service: ServiceConfig::from_profiled(&env),
            server: ServerConfig::from_profiled(&env),
            broker: BrokerConfig::from_profiled(&env),
            worker: WorkerConfig::from_profiled(&env),
            providers: ProviderConfig::from_profiled(&env),
            log_level: env.or("LOG_LEVEL", "info"),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Reject values the publisher or consumer cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let b = &self.broker;
        for (key, value) in [
            ("BROKER_EXCHANGE", &b.exchange),
            ("BROKER_QUEUE", &b.queue),
            ("BROKER_ROUTING_KEY", &b.routing_key),
            ("BROKER_PUBLISH_ROUTING_KEY", &b.publish_routing_key),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    key,
                    reason: "must not be empty".into(),
                });
            }
        }
        if !binding_matches(&b.routing_key, &b.publish_routing_key) {
            return Err(ConfigError::Invalid {
                key: "BROKER_PUBLISH_ROUTING_KEY",
                reason: format!(
                    "'{}' is not routed by binding '{}'",
                    b.publish_routing_key, b.routing_key
                ),
            });
        }
        if b.prefetch_count == 0 {
            return Err(ConfigError::Invalid {
                key: "BROKER_PREFETCH_COUNT",
                reason: "must be at least 1".into(),
            });
        }
        if b.publish_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "BROKER_PUBLISH_TIMEOUT_MS",
                reason: "must be at least 1".into(),
            });
        }
        if self.worker.concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "WORKER_CONCURRENCY",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  service:     name={}, version={}", self.service.name, self.service.version);
        tracing::info!("  server:      {}", self.server.bind_addr());
        tracing::info!("  broker:      url={}, consume_url={}", self.broker.url, self.broker.consume_url);
        tracing::info!(
            "  routing:     exchange={}, queue={}, binding={}, publish_key={}",
            self.broker.exchange,
            self.broker.queue,
            self.broker.routing_key,
            self.broker.publish_routing_key
        );
        tracing::info!(
            "  worker:      prefetch={}, concurrency={}, embedded={}",
            self.broker.prefetch_count,
            self.worker.concurrency,
            self.worker.embedded
        );
        tracing::info!(
            "  providers:   smtp={}, sms_webhook={}, push_webhook={}, log_fallback={}",
            self.providers.smtp.as_ref().map(|s| s.host.as_str()).unwrap_or("(none)"),
            self.providers.sms_webhook_url.is_some(),
            self.providers.push_webhook_url.is_some(),
            self.providers.log_fallback
        );
    }

    /// Return a redacted view safe for API responses (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "service": { "name": self.service.name, "version": self.service.version },
            "server": { "host": self.server.host, "port": self.server.port },
            "broker": {
                "exchange": self.broker.exchange,
                "queue": self.broker.queue,
                "routing_key": self.broker.routing_key,
                "publish_routing_key": self.broker.publish_routing_key,
                "prefetch_count": self.broker.prefetch_count,
                "in_memory": self.broker.is_in_memory(),
            },
            "worker": { "concurrency": self.worker.concurrency, "embedded": self.worker.embedded },
            "providers": {
                "smtp": self.providers.smtp.is_some(),
                "sms_webhook": self.providers.sms_webhook_url.is_some(),
                "push_webhook": self.providers.push_webhook_url.is_some(),
                "log_fallback": self.providers.log_fallback,
            },
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup("", |_| None)
    }
}

// ── Service ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Stamped as the `source` header on every published envelope.
    pub name: String,
    pub version: String,
}

impl ServiceConfig {
    fn from_profiled(env: &Profiled<'_>) -> Self {
        Self {
            name: env.or("APP_NAME", "herald"),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
}

impl ServerConfig {
    fn from_profiled(env: &Profiled<'_>) -> Self {
        Self {
            host: env.or("HOST", "0.0.0.0"),
            port: env.parsed("PORT", 8000),
            cors_origin: env.or("CORS_ORIGIN", "*"),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ── Broker ────────────────────────────────────────────────────

/// URL scheme selecting the in-process queue instead of ZeroMQ.
pub const MEMORY_BROKER_URL: &str = "memory://";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Publish-side endpoint (broker frontend).
    pub url: String,
    /// Consume-side endpoint (broker backend).
    pub consume_url: String,
    pub exchange: String,
    pub queue: String,
    /// Queue binding pattern.
    pub routing_key: String,
    /// Routing key stamped on published envelopes.
    pub publish_routing_key: String,
    /// Max in-flight messages per consumer.
    pub prefetch_count: u16,
    pub publish_timeout_ms: u64,
}

impl BrokerConfig {
    fn from_profiled(env: &Profiled<'_>) -> Self {
        Self {
            url: env.or("BROKER_URL", "tcp://127.0.0.1:5560"),
            consume_url: env.or("BROKER_CONSUME_URL", "tcp://127.0.0.1:5561"),
            exchange: env.or("BROKER_EXCHANGE", "notifications.exchange"),
            queue: env.or("BROKER_QUEUE", "notifications.queue"),
            routing_key: env.or("BROKER_ROUTING_KEY", "notifications.*"),
            publish_routing_key: env.or("BROKER_PUBLISH_ROUTING_KEY", "notifications.broadcast"),
            prefetch_count: env.parsed("BROKER_PREFETCH_COUNT", 64),
            publish_timeout_ms: env.parsed("BROKER_PUBLISH_TIMEOUT_MS", 5000),
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.url.starts_with(MEMORY_BROKER_URL)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

// ── Worker ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Max concurrent channel sends per consumer.
    pub concurrency: usize,
    /// Run a consumer inside the HTTP server process.
    pub embedded: bool,
}

impl WorkerConfig {
    fn from_profiled(env: &Profiled<'_>) -> Self {
        Self {
            concurrency: env.parsed("WORKER_CONCURRENCY", 4),
            embedded: env.flag("WORKER_EMBEDDED", true),
        }
    }
}

// ── Delivery providers ────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    pub port: Option<u16>,
    pub tls: Option<bool>,
    pub from: String,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Present only when both `SMTP_HOST` and `SMTP_FROM` are set.
    pub smtp: Option<SmtpConfig>,
    pub sms_webhook_url: Option<String>,
    pub push_webhook_url: Option<String>,
    /// Bearer token sent to webhook gateways.
    #[serde(skip_serializing)]
    pub webhook_token: Option<String>,
    /// Log deliveries for channels without a configured provider instead of
    /// leaving them unregistered.
    pub log_fallback: bool,
}

impl ProviderConfig {
    fn from_profiled(env: &Profiled<'_>) -> Self {
        let smtp = match (env.opt("SMTP_HOST"), env.opt("SMTP_FROM")) {
            (Some(host), Some(from)) => Some(SmtpConfig {
                host,
                port: env.opt("SMTP_PORT").and_then(|v| v.parse().ok()),
                tls: env.opt("SMTP_TLS").map(|_| env.flag("SMTP_TLS", true)),
                from,
                username: env.opt("SMTP_USERNAME"),
                password: env.opt("SMTP_PASSWORD"),
            }),
            _ => None,
        };
        Self {
            smtp,
            sms_webhook_url: env.opt("SMS_WEBHOOK_URL"),
            push_webhook_url: env.opt("PUSH_WEBHOOK_URL"),
            webhook_token: env.opt("PROVIDER_WEBHOOK_TOKEN"),
            log_fallback: env.flag("PROVIDER_LOG_FALLBACK", true),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(profile: &str, pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(profile, move |key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_match_broker_topology() {
        let cfg = Config::default();
        assert_eq!(cfg.profile_label(), "default");
        assert_eq!(cfg.broker.exchange, "notifications.exchange");
        assert_eq!(cfg.broker.queue, "notifications.queue");
        assert_eq!(cfg.broker.routing_key, "notifications.*");
        assert_eq!(cfg.broker.publish_routing_key, "notifications.broadcast");
        assert_eq!(cfg.broker.prefetch_count, 64);
        assert_eq!(cfg.worker.concurrency, 4);
        assert!(cfg.worker.embedded);
        assert!(cfg.providers.smtp.is_none());
        assert!(cfg.providers.log_fallback);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn profile_prefix_wins_over_plain_key() {
        let cfg = config_from(
            "prod",
            &[("PORT", "9000"), ("PROD_PORT", "9443"), ("BROKER_QUEUE", "q1")],
        );
        assert_eq!(cfg.profile, "PROD");
        assert_eq!(cfg.server.port, 9443);
        assert_eq!(cfg.broker.queue, "q1");
    }

    #[test]
    fn unparseable_numbers_fall_back() {
        let cfg = config_from("", &[("BROKER_PREFETCH_COUNT", "lots")]);
        assert_eq!(cfg.broker.prefetch_count, 64);
    }

    #[test]
    fn flags_accept_common_spellings() {
        assert!(!config_from("", &[("WORKER_EMBEDDED", "false")]).worker.embedded);
        assert!(!config_from("", &[("WORKER_EMBEDDED", "0")]).worker.embedded);
        assert!(config_from("", &[("WORKER_EMBEDDED", "YES")]).worker.embedded);
    }

    #[test]
    fn smtp_requires_host_and_from() {
        let cfg = config_from("", &[("SMTP_HOST", "smtp.example.com")]);
        assert!(cfg.providers.smtp.is_none());

        let cfg = config_from(
            "",
            &[
                ("SMTP_HOST", "smtp.example.com"),
                ("SMTP_FROM", "noreply@example.com"),
                ("SMTP_PORT", "465"),
                ("SMTP_PASSWORD", "hunter2"),
            ],
        );
        let smtp = cfg.providers.smtp.as_ref().unwrap();
        assert_eq!(smtp.port, Some(465));
        assert_eq!(smtp.tls, None);
        assert_eq!(smtp.password.as_deref(), Some("hunter2"));
    }

    #[test]
    fn validate_rejects_zero_tuning_values() {
        let cfg = config_from("", &[("WORKER_CONCURRENCY", "0")]);
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("WORKER_CONCURRENCY"));

        let cfg = config_from("", &[("BROKER_PREFETCH_COUNT", "0")]);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_publish_key_outside_binding() {
        let cfg = config_from("", &[("BROKER_PUBLISH_ROUTING_KEY", "alerts.broadcast")]);
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("BROKER_PUBLISH_ROUTING_KEY"));

        let cfg = config_from(
            "",
            &[
                ("BROKER_ROUTING_KEY", "notifications.#"),
                ("BROKER_PUBLISH_ROUTING_KEY", "notifications.email.urgent"),
            ],
        );
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn memory_url_detected() {
        let cfg = config_from("", &[("BROKER_URL", "memory://")]);
        assert!(cfg.broker.is_in_memory());
        assert!(!Config::default().broker.is_in_memory());
    }

    #[test]
    fn redacted_summary_hides_secrets() {
        let cfg = config_from(
            "",
            &[
                ("SMTP_HOST", "smtp.example.com"),
                ("SMTP_FROM", "noreply@example.com"),
                ("SMTP_PASSWORD", "hunter2"),
                ("PROVIDER_WEBHOOK_TOKEN", "tok"),
            ],
        );
        let text = cfg.redacted_summary().to_string();
        assert!(!text.contains("hunter2"));
        assert!(!text.contains("tok\""));
        assert_eq!(cfg.redacted_summary()["providers"]["smtp"], true);
    }
}
