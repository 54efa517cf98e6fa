//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The client secret is loaded from CLOUD_CLIENT_SECRET or secret_file,
//! never stored in the TOML directly to avoid leaking secrets.

use cloud_activity::{OperationKind, PollConfig, UnexpectedActivityPolicy};
use cloud_auth::{DEFAULT_API_SUFFIX, DEFAULT_REFRESH_MARGIN_SECS, DEFAULT_TOKEN_LIFETIME_SECS};
use common::Secret;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Longest wait cloudctl accepts: one week
const MAX_WAIT_LIMIT_SECS: u64 = 7 * 24 * 60 * 60;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub polling: PollingConfig,
}

/// API endpoint and client credentials
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_api_suffix")]
    pub api_suffix: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    /// Path to a file containing the client secret (alternative to CLOUD_CLIENT_SECRET)
    #[serde(default)]
    pub secret_file: Option<PathBuf>,
}

/// Token lifecycle tuning
#[derive(Debug, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_refresh_margin")]
    pub refresh_margin_secs: u64,
    #[serde(default = "default_token_lifetime")]
    pub default_lifetime_secs: u64,
}

/// Operation polling
#[derive(Debug, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_max_wait")]
    pub max_wait_secs: u64,
    #[serde(default)]
    pub error_on_unexpected_activity: bool,
}

fn default_api_suffix() -> String {
    DEFAULT_API_SUFFIX.to_string()
}

fn default_refresh_margin() -> u64 {
    DEFAULT_REFRESH_MARGIN_SECS
}

fn default_token_lifetime() -> u64 {
    DEFAULT_TOKEN_LIFETIME_SECS
}

fn default_interval() -> u64 {
    5
}

fn default_max_wait() -> u64 {
    1800
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            refresh_margin_secs: default_refresh_margin(),
            default_lifetime_secs: default_token_lifetime(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            max_wait_secs: default_max_wait(),
            error_on_unexpected_activity: false,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Client secret resolution order:
    /// 1. CLOUD_CLIENT_SECRET env var
    /// 2. secret_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if !config.api.base_url.starts_with("http://")
            && !config.api.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                config.api.base_url
            )));
        }

        if config.polling.interval_secs == 0 {
            return Err(common::Error::Config(
                "interval_secs must be greater than 0".into(),
            ));
        }

        if config.polling.max_wait_secs == 0 {
            return Err(common::Error::Config(
                "max_wait_secs must be greater than 0".into(),
            ));
        }

        if config.polling.max_wait_secs > MAX_WAIT_LIMIT_SECS {
            return Err(common::Error::Config(format!(
                "max_wait_secs must be at most {MAX_WAIT_LIMIT_SECS}, got: {}",
                config.polling.max_wait_secs
            )));
        }

        if config.polling.interval_secs > config.polling.max_wait_secs {
            return Err(common::Error::Config(
                "interval_secs must not exceed max_wait_secs".into(),
            ));
        }

        if let Ok(id) = std::env::var("CLOUD_CLIENT_ID") {
            config.api.client_id = id;
        }
        if config.api.client_id.trim().is_empty() {
            return Err(common::Error::Config(
                "client_id is not set (config api.client_id or CLOUD_CLIENT_ID)".into(),
            ));
        }

        // Env var takes precedence over file
        if let Ok(secret) = std::env::var("CLOUD_CLIENT_SECRET") {
            config.api.client_secret = Secret::from_trimmed(&secret);
        } else if let Some(ref secret_file) = config.api.secret_file {
            config.api.client_secret = Secret::from_file(secret_file)?;
        }
        if config.api.client_secret.is_none() {
            return Err(common::Error::Config(
                "client secret is not set (CLOUD_CLIENT_SECRET or api.secret_file)".into(),
            ));
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CLOUDCTL_CONFIG env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CLOUDCTL_CONFIG") {
            return PathBuf::from(p);
        }
        PathBuf::from("cloudctl.toml")
    }

    /// `{base_url}{api_suffix}` without a trailing slash.
    pub fn api_root(&self) -> String {
        format!(
            "{}{}",
            self.api.base_url.trim_end_matches('/'),
            self.api.api_suffix
        )
        .trim_end_matches('/')
        .to_string()
    }

    pub fn refresh_margin(&self) -> Duration {
        Duration::from_secs(self.auth.refresh_margin_secs)
    }

    pub fn default_lifetime(&self) -> Duration {
        Duration::from_secs(self.auth.default_lifetime_secs)
    }

    pub fn poll_config(&self, kind: OperationKind) -> PollConfig {
        PollConfig {
            interval: Duration::from_secs(self.polling.interval_secs),
            max_wait: Duration::from_secs(self.polling.max_wait_secs),
            unexpected: UnexpectedActivityPolicy::from_flag(
                self.polling.error_on_unexpected_activity,
            ),
            ..PollConfig::for_kind(kind)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mutex to serialize tests that mutate environment variables, preventing
    /// data races when tests run in parallel.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn clear_env() {
        unsafe {
            remove_env("CLOUD_CLIENT_SECRET");
            remove_env("CLOUD_CLIENT_ID");
        }
    }

    fn write(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn minimal_toml() -> &'static str {
        r#"
[api]
base_url = "https://cloud.example.com"
client_id = "client-1"
"#
    }

    #[test]
    fn test_load_applies_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        unsafe { set_env("CLOUD_CLIENT_SECRET", "s3cret") };

        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&write(&dir, "config.toml", minimal_toml())).unwrap();

        assert_eq!(config.api.api_suffix, "/api");
        assert_eq!(config.api_root(), "https://cloud.example.com/api");
        assert_eq!(config.refresh_margin(), Duration::from_secs(60));
        assert_eq!(config.default_lifetime(), Duration::from_secs(300));
        assert_eq!(config.polling.interval_secs, 5);
        assert_eq!(config.polling.max_wait_secs, 1800);
        assert!(!config.polling.error_on_unexpected_activity);
        assert_eq!(config.api.client_secret.as_ref().unwrap().expose(), "s3cret");

        clear_env();
    }

    #[test]
    fn test_load_full_config() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let secret = write(&dir, "secret", "from-file\n");
        let toml_content = format!(
            r#"
[api]
base_url = "http://localhost:8080/"
api_suffix = "/v2/"
client_id = "client-2"
secret_file = "{}"

[auth]
refresh_margin_secs = 30
default_lifetime_secs = 120

[polling]
interval_secs = 2
max_wait_secs = 60
error_on_unexpected_activity = true
"#,
            secret.display()
        );

        let config = Config::load(&write(&dir, "config.toml", &toml_content)).unwrap();
        assert_eq!(config.api_root(), "http://localhost:8080/v2");
        assert_eq!(config.api.client_secret.as_ref().unwrap().expose(), "from-file");
        assert_eq!(config.refresh_margin(), Duration::from_secs(30));

        let poll = config.poll_config(OperationKind::BackupJob);
        assert_eq!(poll.interval, Duration::from_secs(2));
        assert_eq!(poll.max_wait, Duration::from_secs(60));
        assert_eq!(poll.unexpected, UnexpectedActivityPolicy::Fail);
        assert_eq!(poll.vocabulary, cloud_activity::BACKUP_JOB_PHASES);
    }

    #[test]
    fn test_secret_env_overrides_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let secret = write(&dir, "secret", "file-value");
        let toml_content = format!(
            "{}secret_file = \"{}\"\n",
            minimal_toml(),
            secret.display()
        );

        unsafe { set_env("CLOUD_CLIENT_SECRET", "env-value") };
        let config = Config::load(&write(&dir, "config.toml", &toml_content)).unwrap();
        assert_eq!(config.api.client_secret.as_ref().unwrap().expose(), "env-value");
        clear_env();
    }

    #[test]
    fn test_client_id_env_override() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        unsafe {
            set_env("CLOUD_CLIENT_SECRET", "s");
            set_env("CLOUD_CLIENT_ID", "from-env");
        }
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&write(&dir, "config.toml", minimal_toml())).unwrap();
        assert_eq!(config.api.client_id, "from-env");
        clear_env();
    }

    #[test]
    fn test_missing_secret_is_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&write(&dir, "config.toml", minimal_toml())).unwrap_err();
        assert!(err.to_string().contains("client secret"), "got: {err}");
    }

    #[test]
    fn test_blank_secret_file_is_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let secret = write(&dir, "secret", "  \n");
        let toml_content = format!(
            "{}secret_file = \"{}\"\n",
            minimal_toml(),
            secret.display()
        );
        assert!(Config::load(&write(&dir, "config.toml", &toml_content)).is_err());
    }

    #[test]
    fn test_unreadable_secret_file_is_reported() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let toml_content = format!(
            "{}secret_file = \"{}\"\n",
            minimal_toml(),
            dir.path().join("missing").display()
        );
        let err = Config::load(&write(&dir, "config.toml", &toml_content)).unwrap_err();
        assert!(matches!(err, common::Error::SecretFile { .. }), "got: {err:?}");
    }

    #[test]
    fn test_invalid_base_url() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        unsafe { set_env("CLOUD_CLIENT_SECRET", "s") };
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "config.toml",
            "[api]\nbase_url = \"ftp://cloud.example.com\"\nclient_id = \"c\"\n",
        );
        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("base_url"));
        clear_env();
    }

    #[test]
    fn test_zero_interval_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        unsafe { set_env("CLOUD_CLIENT_SECRET", "s") };
        let dir = tempfile::tempdir().unwrap();
        let toml_content = format!("{}\n[polling]\ninterval_secs = 0\n", minimal_toml());
        let err = Config::load(&write(&dir, "config.toml", &toml_content)).unwrap_err();
        assert!(err.to_string().contains("interval_secs"));
        clear_env();
    }

    #[test]
    fn test_huge_max_wait_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        unsafe { set_env("CLOUD_CLIENT_SECRET", "s") };
        let dir = tempfile::tempdir().unwrap();
        let toml_content = format!(
            "{}\n[polling]\nmax_wait_secs = {}\n",
            minimal_toml(),
            i64::MAX
        );
        let err = Config::load(&write(&dir, "config.toml", &toml_content)).unwrap_err();
        assert!(err.to_string().contains("max_wait_secs must be at most"), "got: {err}");
        clear_env();
    }

    #[test]
    fn test_one_week_max_wait_accepted() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        unsafe { set_env("CLOUD_CLIENT_SECRET", "s") };
        let dir = tempfile::tempdir().unwrap();
        let toml_content = format!("{}\n[polling]\nmax_wait_secs = 604800\n", minimal_toml());
        let config = Config::load(&write(&dir, "config.toml", &toml_content)).unwrap();
        assert_eq!(
            config.poll_config(OperationKind::Activity).max_wait,
            Duration::from_secs(604_800)
        );
        clear_env();
    }

    #[test]
    fn test_missing_client_id_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_env();
        unsafe { set_env("CLOUD_CLIENT_SECRET", "s") };
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "config.toml",
            "[api]\nbase_url = \"https://cloud.example.com\"\n",
        );
        let err = Config::load(&path).unwrap_err();
        assert!(err.to_string().contains("client_id"));
        clear_env();
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "bad.toml", "not valid {{{{ toml");
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_resolve_path_cli_arg() {
        let path = Config::resolve_path(Some("/custom/path.toml"));
        assert_eq!(path, PathBuf::from("/custom/path.toml"));
    }

    #[test]
    fn test_resolve_path_env_var() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CLOUDCTL_CONFIG", "/env/path.toml") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("/env/path.toml"));
        unsafe { remove_env("CLOUDCTL_CONFIG") };
    }

    #[test]
    fn test_resolve_path_default() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("CLOUDCTL_CONFIG") };
        assert_eq!(Config::resolve_path(None), PathBuf::from("cloudctl.toml"));
    }
}
