//! Settings provider abstraction.
//!
//! The pipeline never caches settings: it asks its `SettingsProvider` for a
//! fresh `FilterConfig` snapshot for every event, so an operator changing the
//! webhook URL or flipping the enable switch affects the next event without a
//! restart. A write racing with an in-flight decision is last-write-wins: the
//! event being evaluated may see either value, the following event sees the
//! new one.
//!
//! Reads never fail. A store that cannot be read yields default settings and
//! a warning, which with an empty webhook URL means nothing is sent.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::{
    error::{CoreError, Result},
    models::FilterConfig,
};

/// Settings key for the enable switch.
pub const KEY_LISTENER_ENABLED: &str = "listener_enabled";
/// Settings key for the webhook URL.
pub const KEY_WEBHOOK_URL: &str = "webhook_url";
/// Settings key for the shared secret.
pub const KEY_WEBHOOK_SECRET: &str = "webhook_secret";
/// Settings key for the source allow-list.
pub const KEY_ALLOWED_PACKAGES: &str = "allowed_packages";

/// Source of `FilterConfig` snapshots.
#[async_trait::async_trait]
pub trait SettingsProvider: Send + Sync + std::fmt::Debug {
    /// Returns the current settings, or defaults if the store is unavailable.
    async fn snapshot(&self) -> FilterConfig;
}

/// In-process settings, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemorySettings {
    inner: RwLock<FilterConfig>,
}

impl MemorySettings {
    /// Creates a store holding `config`.
    pub fn new(config: FilterConfig) -> Self {
        Self { inner: RwLock::new(config) }
    }

    /// Replaces every setting at once.
    pub async fn replace(&self, config: FilterConfig) {
        *self.inner.write().await = config;
    }

    /// Sets `listener_enabled`.
    pub async fn set_enabled(&self, enabled: bool) {
        self.inner.write().await.enabled = enabled;
    }

    /// Sets `webhook_url`.
    pub async fn set_destination_url(&self, url: impl Into<String>) {
        self.inner.write().await.destination_url = url.into();
    }

    /// Sets `webhook_secret`.
    pub async fn set_shared_secret(&self, secret: impl Into<String>) {
        self.inner.write().await.shared_secret = secret.into();
    }

    /// Sets `allowed_packages`.
    pub async fn set_allowed_source_ids(&self, sources: BTreeSet<String>) {
        self.inner.write().await.allowed_source_ids = sources;
    }
}

#[async_trait::async_trait]
impl SettingsProvider for MemorySettings {
    async fn snapshot(&self) -> FilterConfig {
        self.inner.read().await.clone()
    }
}

/// Settings persisted as a JSON document keyed by the settings store keys.
///
/// Every snapshot re-reads the file, so edits made by another process are
/// picked up on the next event.
#[derive(Debug, Clone)]
pub struct JsonFileSettings {
    path: PathBuf,
}

impl JsonFileSettings {
    /// Creates a provider backed by the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the settings file.
    ///
    /// A missing file is not an error and yields defaults.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::ConfigUnavailable` if the file exists but cannot be
    /// read or parsed.
    pub async fn load(&self) -> Result<FilterConfig> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "settings file absent, using defaults");
                return Ok(FilterConfig::default());
            },
            Err(e) => {
                return Err(CoreError::config_unavailable(format!(
                    "failed to read {}: {e}",
                    self.path.display()
                )));
            },
        };

        serde_json::from_slice(&bytes).map_err(|e| {
            CoreError::config_unavailable(format!("failed to parse {}: {e}", self.path.display()))
        })
    }

    /// Applies `change` to the stored settings and writes them back.
    ///
    /// The write goes to a sibling temporary file which is then renamed over
    /// the original, so concurrent readers see either the old or the new
    /// document.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::ConfigUnavailable` if the current file cannot be
    /// parsed (it is left untouched) or the new one cannot be written.
    pub async fn update<F>(&self, change: F) -> Result<FilterConfig>
    where
        F: FnOnce(&mut FilterConfig),
    {
        let mut config = self.load().await?;
        change(&mut config);

        let document = serde_json::to_vec_pretty(&config)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                CoreError::config_unavailable(format!("failed to create {}: {e}", parent.display()))
            })?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, &document).await.map_err(|e| {
            CoreError::config_unavailable(format!("failed to write {}: {e}", temp_path.display()))
        })?;
        tokio::fs::rename(&temp_path, &self.path).await.map_err(|e| {
            CoreError::config_unavailable(format!("failed to replace {}: {e}", self.path.display()))
        })?;

        debug!(path = %self.path.display(), "settings written");
        Ok(config)
    }
}

#[async_trait::async_trait]
impl SettingsProvider for JsonFileSettings {
    async fn snapshot(&self) -> FilterConfig {
        match self.load().await {
            Ok(config) => config,
            Err(error) => {
                warn!(error = %error, "settings unavailable, falling back to defaults");
                FilterConfig::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_settings_changes_visible_on_next_snapshot() {
        let settings = MemorySettings::new(FilterConfig::new("https://example.test/hook", "a"));

        settings.set_shared_secret("b").await;
        settings.set_enabled(false).await;

        let snapshot = settings.snapshot().await;
        assert_eq!(snapshot.shared_secret, "b");
        assert!(!snapshot.enabled);
    }

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = JsonFileSettings::new(dir.path().join("settings.json"));

        assert_eq!(settings.snapshot().await, FilterConfig::default());
    }

    #[tokio::test]
    async fn corrupt_file_yields_defaults_but_load_reports() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();
        let settings = JsonFileSettings::new(&path);

        assert!(matches!(settings.load().await, Err(CoreError::ConfigUnavailable { .. })));
        assert_eq!(settings.snapshot().await, FilterConfig::default());
    }

    #[tokio::test]
    async fn update_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = JsonFileSettings::new(dir.path().join("nested").join("settings.json"));

        settings
            .update(|config| {
                config.destination_url = "https://example.test/hook".to_string();
                config.allowed_source_ids.insert("id.dana".to_string());
            })
            .await
            .unwrap();

        let snapshot = settings.snapshot().await;
        assert_eq!(snapshot.destination_url, "https://example.test/hook");
        assert!(snapshot.allowed_source_ids.contains("id.dana"));
        assert!(snapshot.enabled);

        let raw: serde_json::Value =
            serde_json::from_slice(&tokio::fs::read(settings.path()).await.unwrap()).unwrap();
        for key in [KEY_LISTENER_ENABLED, KEY_WEBHOOK_URL, KEY_WEBHOOK_SECRET, KEY_ALLOWED_PACKAGES] {
            assert!(raw.get(key).is_some(), "missing key {key}");
        }
    }

    #[tokio::test]
    async fn update_refuses_to_clobber_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        tokio::fs::write(&path, b"[]").await.unwrap();
        let settings = JsonFileSettings::new(&path);

        let result = settings.update(|config| config.enabled = false).await;

        assert!(result.is_err());
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"[]");
    }
}
