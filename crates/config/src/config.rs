//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Socket address to bind the HTTP listener to
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:5000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

/// Authentication and session configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthConfig {
    /// Shared password gating every request surface
    #[serde(default = "default_password")]
    pub password: String,
    /// Session signing secret. When absent a random secret is generated at
    /// startup, invalidating all issued tokens on every restart.
    pub session_secret: Option<String>,
    /// Session token lifetime in seconds
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    /// Minimum wall-clock duration of every authentication attempt, in
    /// milliseconds. Applies on both success and failure.
    #[serde(default = "default_login_delay_ms")]
    pub login_delay_ms: u64,
}

fn default_password() -> String {
    "changeme".to_string()
}

fn default_session_ttl_secs() -> u64 {
    86_400
}

fn default_login_delay_ms() -> u64 {
    1_000
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            password: default_password(),
            session_secret: None,
            session_ttl_secs: default_session_ttl_secs(),
            login_delay_ms: default_login_delay_ms(),
        }
    }
}

/// Job execution configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobsConfig {
    /// Maximum simultaneously running jobs (0 = unbounded)
    #[serde(default)]
    pub max_concurrent: u32,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self { max_concurrent: 0 }
    }
}

/// Artifact retention configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetentionConfig {
    /// How long completed/failed jobs and their artifacts remain available,
    /// in seconds
    #[serde(default = "default_retention_ttl_secs")]
    pub ttl_secs: u64,
    /// Interval between sweeper passes, in seconds
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_retention_ttl_secs() -> u64 {
    3_600
}

fn default_sweep_interval_secs() -> u64 {
    300
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_retention_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Media engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Directory where finished artifacts are written
    #[serde(default = "default_download_dir")]
    pub download_dir: String,
    /// Optional cookies file passed through to the retrieval tool
    pub cookies_file: Option<String>,
    /// Maximum artifact size in megabytes
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
}

fn default_download_dir() -> String {
    "./downloads".to_string()
}

fn default_max_file_size_mb() -> u64 {
    500
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            cookies_file: None,
            max_file_size_mb: default_max_file_size_mb(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the config.toml file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - BIND_ADDR -> server.bind_addr
    /// - APP_PASSWORD -> auth.password
    /// - SESSION_SECRET -> auth.session_secret
    /// - SESSION_TTL_SECS -> auth.session_ttl_secs
    /// - LOGIN_DELAY_MS -> auth.login_delay_ms
    /// - MAX_CONCURRENT_JOBS -> jobs.max_concurrent
    /// - RETENTION_TTL_SECS -> retention.ttl_secs
    /// - SWEEP_INTERVAL_SECS -> retention.sweep_interval_secs
    /// - DOWNLOAD_DIR -> engine.download_dir
    /// - COOKIES_FILE -> engine.cookies_file
    /// - MAX_FILE_SIZE_MB -> engine.max_file_size_mb
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("BIND_ADDR") {
            if !val.is_empty() {
                self.server.bind_addr = val;
            }
        }

        if let Ok(val) = env::var("APP_PASSWORD") {
            if !val.is_empty() {
                self.auth.password = val;
            }
        }

        if let Ok(val) = env::var("SESSION_SECRET") {
            if !val.is_empty() {
                self.auth.session_secret = Some(val);
            }
        }

        if let Ok(val) = env::var("SESSION_TTL_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                self.auth.session_ttl_secs = secs;
            }
        }

        if let Ok(val) = env::var("LOGIN_DELAY_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                self.auth.login_delay_ms = ms;
            }
        }

        if let Ok(val) = env::var("MAX_CONCURRENT_JOBS") {
            if let Ok(jobs) = val.parse::<u32>() {
                self.jobs.max_concurrent = jobs;
            }
        }

        if let Ok(val) = env::var("RETENTION_TTL_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                self.retention.ttl_secs = secs;
            }
        }

        if let Ok(val) = env::var("SWEEP_INTERVAL_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                self.retention.sweep_interval_secs = secs;
            }
        }

        if let Ok(val) = env::var("DOWNLOAD_DIR") {
            if !val.is_empty() {
                self.engine.download_dir = val;
            }
        }

        if let Ok(val) = env::var("COOKIES_FILE") {
            if !val.is_empty() {
                self.engine.cookies_file = Some(val);
            }
        }

        if let Ok(val) = env::var("MAX_FILE_SIZE_MB") {
            if let Ok(mb) = val.parse::<u64>() {
                self.engine.max_file_size_mb = mb;
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Mutex;

    // Mutex to ensure env var tests don't interfere with each other
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to clear all config-related env vars
    fn clear_env_vars() {
        env::remove_var("BIND_ADDR");
        env::remove_var("APP_PASSWORD");
        env::remove_var("SESSION_SECRET");
        env::remove_var("SESSION_TTL_SECS");
        env::remove_var("LOGIN_DELAY_MS");
        env::remove_var("MAX_CONCURRENT_JOBS");
        env::remove_var("RETENTION_TTL_SECS");
        env::remove_var("SWEEP_INTERVAL_SECS");
        env::remove_var("DOWNLOAD_DIR");
        env::remove_var("COOKIES_FILE");
        env::remove_var("MAX_FILE_SIZE_MB");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_config_parses_all_sections(
            password in "[a-zA-Z0-9]{1,32}",
            session_ttl in 60u64..1_000_000,
            login_delay in 0u64..10_000,
            max_concurrent in 0u32..16,
            ttl in 1u64..1_000_000,
            sweep_interval in 1u64..100_000,
            max_mb in 1u64..10_000,
        ) {
            let toml_str = format!(
                r#"
[server]
bind_addr = "127.0.0.1:9000"

[auth]
password = "{}"
session_ttl_secs = {}
login_delay_ms = {}

[jobs]
max_concurrent = {}

[retention]
ttl_secs = {}
sweep_interval_secs = {}

[engine]
download_dir = "/srv/media"
max_file_size_mb = {}
"#,
                password, session_ttl, login_delay, max_concurrent, ttl, sweep_interval, max_mb
            );

            let config = Config::parse_toml(&toml_str).expect("Valid TOML should parse");

            prop_assert_eq!(config.server.bind_addr, "127.0.0.1:9000");
            prop_assert_eq!(config.auth.password, password);
            prop_assert_eq!(config.auth.session_ttl_secs, session_ttl);
            prop_assert_eq!(config.auth.login_delay_ms, login_delay);
            prop_assert_eq!(config.jobs.max_concurrent, max_concurrent);
            prop_assert_eq!(config.retention.ttl_secs, ttl);
            prop_assert_eq!(config.retention.sweep_interval_secs, sweep_interval);
            prop_assert_eq!(config.engine.download_dir, "/srv/media");
            prop_assert_eq!(config.engine.max_file_size_mb, max_mb);
            prop_assert_eq!(config.engine.cookies_file, None);
        }

        #[test]
        fn prop_env_overrides_password(
            initial in "[a-zA-Z0-9]{1,16}",
            override_pw in "[a-zA-Z0-9]{1,16}",
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let toml_str = format!(
                r#"
[auth]
password = "{}"
"#,
                initial
            );

            let mut config = Config::parse_toml(&toml_str).expect("Valid TOML");

            env::set_var("APP_PASSWORD", &override_pw);
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(config.auth.password, override_pw);
        }

        #[test]
        fn prop_env_overrides_retention(
            initial_ttl in 1u64..100_000,
            override_ttl in 1u64..100_000,
            override_interval in 1u64..100_000,
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let toml_str = format!(
                r#"
[retention]
ttl_secs = {}
"#,
                initial_ttl
            );

            let mut config = Config::parse_toml(&toml_str).expect("Valid TOML");

            env::set_var("RETENTION_TTL_SECS", override_ttl.to_string());
            env::set_var("SWEEP_INTERVAL_SECS", override_interval.to_string());
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(config.retention.ttl_secs, override_ttl);
            prop_assert_eq!(config.retention.sweep_interval_secs, override_interval);
        }

        #[test]
        fn prop_env_overrides_max_concurrent(
            initial in 0u32..8,
            override_jobs in 0u32..16,
        ) {
            let _guard = ENV_MUTEX.lock().unwrap();
            clear_env_vars();

            let toml_str = format!(
                r#"
[jobs]
max_concurrent = {}
"#,
                initial
            );

            let mut config = Config::parse_toml(&toml_str).expect("Valid TOML");

            env::set_var("MAX_CONCURRENT_JOBS", override_jobs.to_string());
            config.apply_env_overrides();
            clear_env_vars();

            prop_assert_eq!(config.jobs.max_concurrent, override_jobs);
        }
    }

    // Test that missing sections use defaults
    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse_toml("").expect("Empty TOML should parse");

        assert_eq!(config.server.bind_addr, "0.0.0.0:5000");
        assert_eq!(config.auth.password, "changeme");
        assert_eq!(config.auth.session_secret, None);
        assert_eq!(config.auth.session_ttl_secs, 86_400);
        assert_eq!(config.auth.login_delay_ms, 1_000);
        assert_eq!(config.jobs.max_concurrent, 0);
        assert_eq!(config.retention.ttl_secs, 3_600);
        assert_eq!(config.retention.sweep_interval_secs, 300);
        assert_eq!(config.engine.download_dir, "./downloads");
        assert_eq!(config.engine.cookies_file, None);
        assert_eq!(config.engine.max_file_size_mb, 500);
    }

    // Test partial config with some sections missing
    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let toml_str = r#"
[auth]
password = "hunter2"
session_secret = "deadbeef"
"#;
        let config = Config::parse_toml(toml_str).expect("Partial TOML should parse");

        assert_eq!(config.auth.password, "hunter2");
        assert_eq!(config.auth.session_secret, Some("deadbeef".to_string()));
        assert_eq!(config.auth.session_ttl_secs, 86_400); // default
        assert_eq!(config.retention.ttl_secs, 3_600); // default
        assert_eq!(config.engine.download_dir, "./downloads"); // default
    }

    #[test]
    fn test_env_override_session_secret() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let mut config = Config::default();
        assert_eq!(config.auth.session_secret, None);

        env::set_var("SESSION_SECRET", "s3cret");
        env::set_var("COOKIES_FILE", "/etc/fetchd/cookies.txt");
        config.apply_env_overrides();
        clear_env_vars();

        assert_eq!(config.auth.session_secret, Some("s3cret".to_string()));
        assert_eq!(
            config.engine.cookies_file,
            Some("/etc/fetchd/cookies.txt".to_string())
        );
    }

    #[test]
    fn test_env_override_ignores_unparsable_numbers() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env_vars();

        let mut config = Config::default();

        env::set_var("RETENTION_TTL_SECS", "not-a-number");
        env::set_var("MAX_CONCURRENT_JOBS", "-3");
        config.apply_env_overrides();
        clear_env_vars();

        assert_eq!(config.retention.ttl_secs, 3_600);
        assert_eq!(config.jobs.max_concurrent, 0);
    }
}
