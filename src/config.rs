//! Service configuration for notify-relay.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use relay_core::{filter::DEFAULT_TRIGGER, RuleSpec, RuleTable};
use relay_delivery::{
    client::{MAX_CALL_TIMEOUT, MAX_CONNECT_TIMEOUT, MAX_READ_TIMEOUT},
    ClientConfig, DEFAULT_EVENT_CHANNEL_CAPACITY,
};
use serde::{Deserialize, Serialize};

/// Default location of the configuration file.
pub const CONFIG_FILE: &str = "relay.toml";

/// Prefix of environment variables that override configuration values.
pub const ENV_PREFIX: &str = "RELAY_";

/// Complete service configuration with defaults, file, and environment
/// overrides.
///
/// Configuration is loaded in priority order:
/// 1. Environment variables prefixed with `RELAY_` (highest priority)
/// 2. Configuration file (`relay.toml`)
/// 3. Built-in defaults (lowest priority)
///
/// Forwarding settings that change at runtime (webhook URL, secret, enable
/// switch, allow-list) are not part of this file; they live in the settings
/// document at `settings_path` and are re-read for every event.
///
/// # Example
///
/// ```no_run
/// use notify_relay::config::Config;
///
/// let config = Config::load().expect("Failed to load configuration");
///
/// println!("settings at {}", config.settings_path.display());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Settings store
    /// Path of the JSON settings document.
    ///
    /// Environment variable: `RELAY_SETTINGS_PATH`
    #[serde(default = "default_settings_path")]
    pub settings_path: PathBuf,

    // Pipeline
    /// Capacity of the channel between the event source and the forwarder.
    ///
    /// Environment variable: `RELAY_EVENT_CHANNEL_CAPACITY`
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
    /// Seconds to wait for in-flight deliveries at shutdown.
    ///
    /// Environment variable: `RELAY_SHUTDOWN_TIMEOUT_SECS`
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    // Client
    /// Total budget of one delivery in seconds, at most 15.
    ///
    /// Environment variable: `RELAY_CALL_TIMEOUT_SECS`
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
    /// Connect budget in seconds, at most 10.
    ///
    /// Environment variable: `RELAY_CONNECT_TIMEOUT_SECS`
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Read budget in seconds, at most 15.
    ///
    /// Environment variable: `RELAY_READ_TIMEOUT_SECS`
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    /// User agent sent with every delivery.
    ///
    /// Environment variable: `RELAY_USER_AGENT`
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    // Supervisor
    /// Window in milliseconds during which repeated reconnects coalesce.
    ///
    /// Environment variable: `RELAY_RECONNECT_COOLDOWN_MS`
    #[serde(default = "default_reconnect_cooldown")]
    pub reconnect_cooldown_ms: u64,
    /// Delay in milliseconds before the rebind attempted at startup.
    ///
    /// Environment variable: `RELAY_INITIAL_REBIND_DELAY_MS`
    #[serde(default = "default_initial_rebind_delay")]
    pub initial_rebind_delay_ms: u64,
    /// How often, in milliseconds, the enable switch is checked for being
    /// turned on.
    ///
    /// Environment variable: `RELAY_SETTINGS_POLL_MS`
    #[serde(default = "default_settings_poll")]
    pub settings_poll_ms: u64,

    // Filter
    /// Trigger rules. Each entry sets exactly one of `contains` or `regex`,
    /// optionally scoped with `source`.
    #[serde(default = "default_rules")]
    pub rules: Vec<RuleSpec>,

    // Logging
    /// Log filter used when `RUST_LOG` is not set.
    ///
    /// Environment variable: `RELAY_RUST_LOG`
    #[serde(default = "default_log_level")]
    pub rust_log: String,
}

impl Config {
    /// Loads configuration from defaults, `relay.toml`, and environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or validation fails.
    pub fn load() -> Result<Self> {
        Self::load_from(CONFIG_FILE)
    }

    /// Loads configuration using `path` as the configuration file. A missing
    /// file is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or validation fails.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX));

        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Delivery client configuration.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            user_agent: self.user_agent.clone(),
        }
    }

    /// Compiles the configured trigger rules.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid rule.
    pub fn rule_table(&self) -> Result<RuleTable> {
        RuleTable::from_specs(&self.rules).context("Invalid trigger rule")
    }

    /// Grace period for in-flight deliveries at shutdown.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Reconnect coalescing window.
    pub fn reconnect_cooldown(&self) -> Duration {
        Duration::from_millis(self.reconnect_cooldown_ms)
    }

    /// Delay before the startup rebind.
    pub fn initial_rebind_delay(&self) -> Duration {
        Duration::from_millis(self.initial_rebind_delay_ms)
    }

    /// Interval of the enable switch watcher.
    pub fn settings_poll_interval(&self) -> Duration {
        Duration::from_millis(self.settings_poll_ms)
    }

    /// Validates configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.event_channel_capacity == 0 {
            anyhow::bail!("event_channel_capacity must be greater than 0");
        }

        check_timeout("call_timeout_secs", self.call_timeout_secs, MAX_CALL_TIMEOUT)?;
        check_timeout("connect_timeout_secs", self.connect_timeout_secs, MAX_CONNECT_TIMEOUT)?;
        check_timeout("read_timeout_secs", self.read_timeout_secs, MAX_READ_TIMEOUT)?;

        if self.settings_poll_ms == 0 {
            anyhow::bail!("settings_poll_ms must be greater than 0");
        }

        if self.user_agent.trim().is_empty() {
            anyhow::bail!("user_agent must not be empty");
        }

        if self.rules.is_empty() {
            anyhow::bail!("rules must contain at least one trigger rule");
        }
        self.rule_table()?;

        Ok(())
    }
}

fn check_timeout(name: &str, seconds: u64, bound: Duration) -> Result<()> {
    if seconds == 0 || seconds > bound.as_secs() {
        anyhow::bail!("{name} must be between 1 and {}", bound.as_secs());
    }
    Ok(())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            settings_path: default_settings_path(),
            event_channel_capacity: default_event_channel_capacity(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            call_timeout_secs: default_call_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            user_agent: default_user_agent(),
            reconnect_cooldown_ms: default_reconnect_cooldown(),
            initial_rebind_delay_ms: default_initial_rebind_delay(),
            settings_poll_ms: default_settings_poll(),
            rules: default_rules(),
            rust_log: default_log_level(),
        }
    }
}

fn default_settings_path() -> PathBuf {
    PathBuf::from("relay-settings.json")
}

fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}

fn default_settings_poll() -> u64 {
    1000
}

fn default_shutdown_timeout() -> u64 {
    20
}

fn default_call_timeout() -> u64 {
    MAX_CALL_TIMEOUT.as_secs()
}

fn default_connect_timeout() -> u64 {
    MAX_CONNECT_TIMEOUT.as_secs()
}

fn default_read_timeout() -> u64 {
    MAX_READ_TIMEOUT.as_secs()
}

fn default_user_agent() -> String {
    ClientConfig::default().user_agent
}

fn default_reconnect_cooldown() -> u64 {
    2000
}

fn default_initial_rebind_delay() -> u64 {
    1200
}

fn default_rules() -> Vec<RuleSpec> {
    vec![RuleSpec::contains(DEFAULT_TRIGGER)]
}

fn default_log_level() -> String {
    "info,notify_relay=debug,relay_delivery=debug".to_string()
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, env, io::Write, sync::Mutex};

    use super::*;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    struct TestEnvGuard {
        _lock: std::sync::MutexGuard<'static, ()>,
        originals: HashMap<String, Option<String>>,
    }

    impl TestEnvGuard {
        fn new() -> Self {
            let lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            Self { _lock: lock, originals: HashMap::new() }
        }

        fn set_var(&mut self, key: &str, value: &str) {
            self.originals.entry(key.to_string()).or_insert_with(|| env::var(key).ok());
            env::set_var(key, value);
        }
    }

    impl Drop for TestEnvGuard {
        fn drop(&mut self) {
            for (key, original) in &self.originals {
                match original {
                    Some(value) => env::set_var(key, value),
                    None => env::remove_var(key),
                }
            }
        }
    }

    fn missing_file() -> PathBuf {
        PathBuf::from("does-not-exist/relay.toml")
    }

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.initial_rebind_delay(), Duration::from_millis(1200));
        assert_eq!(config.reconnect_cooldown(), Duration::from_secs(2));
        assert_eq!(config.rule_table().unwrap().len(), 1);
    }

    #[test]
    fn client_config_uses_delivery_bounds_by_default() {
        let client = Config::default().to_client_config();

        assert_eq!(client.call_timeout, Duration::from_secs(15));
        assert_eq!(client.connect_timeout, Duration::from_secs(10));
        assert_eq!(client.read_timeout, Duration::from_secs(15));
    }

    #[test]
    fn env_overrides_defaults() {
        let mut guard = TestEnvGuard::new();
        guard.set_var("RELAY_EVENT_CHANNEL_CAPACITY", "32");
        guard.set_var("RELAY_CALL_TIMEOUT_SECS", "5");
        guard.set_var("RELAY_SETTINGS_PATH", "/var/lib/relay/settings.json");

        let config = Config::load_from(missing_file()).expect("config should load");

        assert_eq!(config.event_channel_capacity, 32);
        assert_eq!(config.call_timeout_secs, 5);
        assert_eq!(config.settings_path, PathBuf::from("/var/lib/relay/settings.json"));
    }

    #[test]
    fn file_rules_replace_default_rule() {
        let _guard = TestEnvGuard::new();
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
initial_rebind_delay_ms = 50

[[rules]]
source = "id.dana"
contains = "berhasil menerima Rp"

[[rules]]
regex = "menerima\\s+Rp[0-9.]+"
"#
        )
        .unwrap();

        let config = Config::load_from(file.path()).expect("config should load");

        assert_eq!(config.initial_rebind_delay_ms, 50);
        assert_eq!(config.rules.len(), 2);
        assert_eq!(config.rules[0].source.as_deref(), Some("id.dana"));
        assert_eq!(config.rule_table().unwrap().len(), 2);
    }

    #[test]
    fn invalid_regex_rule_rejected_at_load() {
        let _guard = TestEnvGuard::new();
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[[rules]]\nregex = \"(unclosed\"").unwrap();

        assert!(Config::load_from(file.path()).is_err());
    }

    #[test]
    fn invalid_config_validation_fails() {
        let mut config = Config::default();
        config.event_channel_capacity = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.call_timeout_secs = 16;
        assert!(config.validate().is_err());

        config = Config::default();
        config.connect_timeout_secs = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.read_timeout_secs = 60;
        assert!(config.validate().is_err());

        config = Config::default();
        config.settings_poll_ms = 0;
        assert!(config.validate().is_err());

        config = Config::default();
        config.rules.clear();
        assert!(config.validate().is_err());

        config = Config::default();
        config.rules = vec![RuleSpec::default()];
        assert!(config.validate().is_err());
    }
}
