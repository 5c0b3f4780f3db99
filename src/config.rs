use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use url::Url;
use validator::{Validate, ValidationError, ValidationErrors};

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:5000/";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
const DEFAULT_REFUND_METHOD: &str = "bank_transfer";
const DEFAULT_MOCK_HOST: &str = "127.0.0.1";
const DEFAULT_MOCK_PORT: u16 = 5000;
const CONFIG_DIR: &str = "config";
const ENV_PREFIX: &str = "ORDERDESK";

/// Settings shared by the CLI, the reference backend and the tests.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Base URL of the storefront/back-office API
    #[validate(custom = "validate_base_url")]
    pub api_base_url: String,

    /// Per-request timeout in seconds (1 - 300)
    #[serde(default = "default_request_timeout_secs")]
    #[validate(range(min = 1, max = 300))]
    pub request_timeout_secs: u64,

    /// `development`, `test`, `production`, ...
    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// One JSON object per log line
    #[serde(default)]
    pub log_json: bool,

    /// Refund method sent with every refund approval
    #[serde(default = "default_refund_method")]
    #[validate(custom = "validate_non_blank")]
    pub default_refund_method: String,

    /// Where the CLI keeps the authenticated session
    #[serde(default)]
    pub session_file: Option<String>,

    /// Reference backend bind host
    #[serde(default = "default_mock_host")]
    pub mock_host: String,

    /// Reference backend bind port
    #[serde(default = "default_mock_port")]
    pub mock_port: u16,

    /// Administrator seeded into the reference backend
    #[serde(default)]
    pub mock_admin_email: Option<String>,
    #[serde(default)]
    pub mock_admin_password: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: default_request_timeout_secs(),
            environment: default_environment(),
            log_level: default_log_level(),
            log_json: false,
            default_refund_method: default_refund_method(),
            session_file: None,
            mock_host: default_mock_host(),
            mock_port: default_mock_port(),
            mock_admin_email: None,
            mock_admin_password: None,
        }
    }
}

impl AppConfig {
    /// Creates a configuration pointing at `api_base_url`, everything else defaulted.
    pub fn new(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            ..Default::default()
        }
    }

    /// Parsed base URL, always ending in `/` so relative joins keep the path prefix.
    pub fn base_url(&self) -> Result<Url, url::ParseError> {
        let mut raw = self.api_base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Session file location: explicit config, then `$ORDERDESK_CLI_HOME`, then `~/.orderdesk`.
    pub fn session_file_path(&self) -> Option<PathBuf> {
        if let Some(path) = self.session_file.as_ref().filter(|p| !p.trim().is_empty()) {
            return Some(PathBuf::from(path));
        }

        if let Ok(dir) = env::var("ORDERDESK_CLI_HOME") {
            let mut path = PathBuf::from(dir);
            path.push("session.json");
            return Some(path);
        }

        env::var("HOME").ok().map(|home| {
            let mut path = PathBuf::from(home);
            path.push(".orderdesk");
            path.push("session.json");
            path
        })
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.is_production() {
            if let Ok(url) = self.base_url() {
                if url.scheme() != "https" {
                    let mut err = ValidationError::new("api_base_url_insecure");
                    err.message =
                        Some("api_base_url must use https outside development".into());
                    errors.add("api_base_url", err);
                }
            }
        }

        if self.mock_admin_email.is_some() != self.mock_admin_password.is_some() {
            let mut err = ValidationError::new("mock_admin_incomplete");
            err.message =
                Some("mock_admin_email and mock_admin_password must be set together".into());
            errors.add("mock_admin_email", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_refund_method() -> String {
    DEFAULT_REFUND_METHOD.to_string()
}

fn default_mock_host() -> String {
    DEFAULT_MOCK_HOST.to_string()
}

fn default_mock_port() -> u16 {
    DEFAULT_MOCK_PORT
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_base_url(raw: &str) -> Result<(), ValidationError> {
    match Url::parse(raw.trim()) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => Ok(()),
        _ => {
            let mut err = ValidationError::new("api_base_url");
            err.message = Some("Must be an absolute http(s) URL".into());
            Err(err)
        }
    }
}

fn validate_non_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("Must not be blank".into());
        return Err(err);
    }
    Ok(())
}

/// Installs the global subscriber. `RUST_LOG` overrides `level` when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("orderdesk={},tower_http=info", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let builder = fmt()
        .with_env_filter(EnvFilter::new(filter_directive))
        .with_writer(std::io::stderr);
    if json {
        let _ = builder.json().try_init();
    } else {
        let _ = builder.try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (ORDERDESK__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    load_config_from(Path::new(CONFIG_DIR))
}

/// Same as [`load_config`] but reading files from `config_dir`.
pub fn load_config_from(config_dir: &Path) -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !config_dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            config_dir.display()
        );
    }

    let default_file = config_dir.join("default");
    let env_file = config_dir.join(&run_env);

    let config = Config::builder()
        .set_default("api_base_url", DEFAULT_API_BASE_URL)?
        .set_default("request_timeout_secs", DEFAULT_REQUEST_TIMEOUT_SECS)?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("default_refund_method", DEFAULT_REFUND_METHOD)?
        .add_source(File::from(default_file).required(false))
        .add_source(File::from(env_file).required(false))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!(errors = ?e, "Configuration constraints not met");
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn defaults_validate() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert!(cfg.validate_additional_constraints().is_ok());
        assert_eq!(cfg.request_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn base_url_gains_trailing_slash() {
        let cfg = AppConfig::new("http://shop.local/backend");
        assert_eq!(cfg.base_url().unwrap().as_str(), "http://shop.local/backend/");
    }

    #[test]
    fn rejects_relative_base_url_and_bad_log_level() {
        let mut cfg = AppConfig::new("/api");
        cfg.log_level = "verbose".into();
        let errors = cfg.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("api_base_url"));
        assert!(errors.field_errors().contains_key("log_level"));
    }

    #[test]
    fn rejects_blank_refund_method() {
        let mut cfg = AppConfig::default();
        cfg.default_refund_method = "  ".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn production_requires_https() {
        let mut cfg = AppConfig::new("http://shop.example.com");
        cfg.environment = "production".into();
        assert!(cfg.validate_additional_constraints().is_err());

        cfg.api_base_url = "https://shop.example.com".into();
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn mock_admin_credentials_come_in_pairs() {
        let mut cfg = AppConfig::default();
        cfg.mock_admin_email = Some("admin@shop.vn".into());
        assert!(cfg.validate_additional_constraints().is_err());
        cfg.mock_admin_password = Some("secret".into());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn explicit_session_file_wins() {
        let mut cfg = AppConfig::default();
        cfg.session_file = Some("/tmp/orderdesk-session.json".into());
        assert_eq!(
            cfg.session_file_path(),
            Some(PathBuf::from("/tmp/orderdesk-session.json"))
        );
    }

    #[test]
    fn loads_values_from_default_toml() {
        let dir = TempDir::new().unwrap();
        let mut file = std::fs::File::create(dir.path().join("default.toml")).unwrap();
        writeln!(
            file,
            r#"
            api_base_url = "http://backend.test:9000"
            request_timeout_secs = 42
            default_refund_method = "store_credit"
            "#
        )
        .unwrap();

        let cfg = load_config_from(dir.path()).unwrap();
        assert_eq!(cfg.api_base_url, "http://backend.test:9000");
        assert_eq!(cfg.request_timeout_secs, 42);
        assert_eq!(cfg.default_refund_method, "store_credit");
    }

    #[test]
    fn invalid_file_values_fail_validation() {
        let dir = TempDir::new().unwrap();
        let mut file = std::fs::File::create(dir.path().join("default.toml")).unwrap();
        writeln!(file, "request_timeout_secs = 0").unwrap();

        let result = load_config_from(dir.path());
        assert!(matches!(result, Err(AppConfigError::Validation(_))));
    }
}
