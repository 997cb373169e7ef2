// Wizard configuration
//
// Layered with the `config` crate: built-in defaults, then an optional TOML file, then
// `USHADOW_*` environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::utils::logging::{mask_sensitive, mask_url_credentials};
use crate::utils::path_resolver;

pub const CONFIG_PATH_ENV: &str = "USHADOW_WIZARD_CONFIG";
const ENV_PREFIX: &str = "USHADOW";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WizardConfig {
    pub base_url: String,
    #[serde(default)]
    pub token: Option<String>,
    pub poll_interval_ms: u64,
    pub request_timeout_secs: u64,
    pub dashboard_path: String,
    pub events_path: String,
    pub reconnect_delay_ms: u64,
    pub confirm_attempts: u32,
    pub confirm_interval_ms: u64,
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            token: None,
            poll_interval_ms: 3000,
            request_timeout_secs: 30,
            dashboard_path: "/api/queue/dashboard".to_string(),
            events_path: "/api/docker/events".to_string(),
            reconnect_delay_ms: 5000,
            confirm_attempts: 10,
            confirm_interval_ms: 2000,
            state_dir: None,
        }
    }
}

impl WizardConfig {
    /// Load using the process environment. The file comes from `USHADOW_WIZARD_CONFIG`
    /// or the platform config dir; a missing file is fine.
    pub fn load() -> Result<Self> {
        let path = match std::env::var_os(CONFIG_PATH_ENV) {
            Some(p) if !p.is_empty() => PathBuf::from(p),
            _ => path_resolver::default_config_file(),
        };
        Self::load_from(Some(&path), None)
    }

    /// `env` replaces the process environment when given (tests).
    pub fn load_from(file: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let defaults = Self::default();
        let mut builder = config::Config::builder()
            .set_default("base_url", defaults.base_url.clone())?
            .set_default("poll_interval_ms", defaults.poll_interval_ms)?
            .set_default("request_timeout_secs", defaults.request_timeout_secs)?
            .set_default("dashboard_path", defaults.dashboard_path.clone())?
            .set_default("events_path", defaults.events_path.clone())?
            .set_default("reconnect_delay_ms", defaults.reconnect_delay_ms)?
            .set_default("confirm_attempts", defaults.confirm_attempts as u64)?
            .set_default("confirm_interval_ms", defaults.confirm_interval_ms)?;

        if let Some(path) = file {
            builder = builder.add_source(
                config::File::from(path.to_path_buf())
                    .format(config::FileFormat::Toml)
                    .required(false),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .source(env),
        );

        let cfg: WizardConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let parsed = Url::parse(&self.base_url)
            .with_context(|| format!("base_url is not a valid URL: {}", self.base_url))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            anyhow::bail!("base_url must use http or https, got '{}'", parsed.scheme());
        }
        if self.poll_interval_ms < 250 {
            anyhow::bail!("poll_interval_ms must be at least 250");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than zero");
        }
        for (name, path) in [
            ("dashboard_path", &self.dashboard_path),
            ("events_path", &self.events_path),
        ] {
            if !path.starts_with('/') {
                anyhow::bail!("{} must start with '/'", name);
            }
        }
        Ok(())
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.trim().is_empty())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn confirm_interval(&self) -> Duration {
        Duration::from_millis(self.confirm_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn state_dir(&self) -> PathBuf {
        path_resolver::resolve_state_dir(self.state_dir.as_deref())
    }

    /// Effective configuration as TOML with credentials masked.
    pub fn to_masked_toml(&self) -> Result<String> {
        let mut shown = self.clone();
        shown.base_url = mask_url_credentials(&self.base_url);
        shown.token = self.token().map(mask_sensitive);
        toml::to_string_pretty(&shown).context("Failed to render configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn defaults_apply_without_file_or_env() {
        let cfg = WizardConfig::load_from(None, env(&[])).unwrap();
        assert_eq!(cfg, WizardConfig::default());
        assert_eq!(cfg.poll_interval(), Duration::from_secs(3));
        assert!(cfg.token().is_none());
    }

    #[test]
    fn file_then_env_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ushadow-wizard.toml");
        std::fs::write(
            &path,
            "base_url = \"http://ushadow.local:8000\"\npoll_interval_ms = 5000\n",
        )
        .unwrap();

        let cfg = WizardConfig::load_from(
            Some(&path),
            env(&[("USHADOW_POLL_INTERVAL_MS", "1000"), ("USHADOW_TOKEN", "abc")]),
        )
        .unwrap();
        assert_eq!(cfg.base_url, "http://ushadow.local:8000");
        assert_eq!(cfg.poll_interval_ms, 1000);
        assert_eq!(cfg.token(), Some("abc"));
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = WizardConfig::load_from(Some(&dir.path().join("nope.toml")), env(&[])).unwrap();
        assert_eq!(cfg.base_url, "http://localhost:8000");
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let err = WizardConfig::load_from(None, env(&[("USHADOW_BASE_URL", "not a url")]))
            .unwrap_err();
        assert!(format!("{:#}", err).contains("base_url"));

        let err = WizardConfig::load_from(None, env(&[("USHADOW_BASE_URL", "ftp://host")]))
            .unwrap_err();
        assert!(format!("{:#}", err).contains("http"));
    }

    #[test]
    fn masked_toml_hides_token() {
        let cfg = WizardConfig {
            token: Some("eyJhbGciOiJIUzI1NiJ9.secret".to_string()),
            ..Default::default()
        };
        let rendered = cfg.to_masked_toml().unwrap();
        assert!(!rendered.contains("secret"), "{}", rendered);
        assert!(rendered.contains("poll_interval_ms = 3000"));
    }
}
