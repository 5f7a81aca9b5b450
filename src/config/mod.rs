use chrono::Duration;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use config::builder::DefaultState;
use serde::Deserialize;
use std::collections::HashSet;
use std::env;

use crate::db::models::App;

/// Ships in `config/development.toml`; never acceptable anywhere else.
pub const DEVELOPMENT_APP_SECRET: &str = "change-me-outside-development";

// Ten years. Larger TTLs overflow chrono when added to the current time.
const MAX_TTL_SECS: i64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

/// Token lifetimes and input limits. Immutable once the service is built.
#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub password_max_len: usize,
}

impl AuthConfig {
    pub fn access_ttl(&self) -> Duration {
        Duration::seconds(self.access_token_ttl_secs)
    }

    pub fn refresh_ttl(&self) -> Duration {
        Duration::seconds(self.refresh_token_ttl_secs)
    }
}

/// Argon2id cost parameters.
#[derive(Debug, Deserialize, Clone)]
pub struct HashingConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub environment: String,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub hashing: HashingConfig,
    /// Relying-party applications provisioned at startup.
    #[serde(default)]
    pub apps: Vec<App>,
}

fn with_defaults(environment: &str) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let hashing = HashingConfig::default();

    Config::builder()
        .set_default("environment", environment)?
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 8000)?
        .set_default("server.workers", num_cpus::get() as i64)?
        .set_default("database.url", "sqlite://sso.db")?
        .set_default("database.max_connections", 5)?
        .set_default("database.acquire_timeout_secs", 5)?
        .set_default("auth.access_token_ttl_secs", 60 * 60)?
        .set_default("auth.refresh_token_ttl_secs", 30 * 24 * 60 * 60)?
        .set_default("auth.password_max_len", 72)?
        .set_default("hashing.memory_kib", hashing.memory_kib as i64)?
        .set_default("hashing.iterations", hashing.iterations as i64)?
        .set_default("hashing.parallelism", hashing.parallelism as i64)
}

fn app_environment() -> Environment {
    // E.g., `APP_SERVER__PORT=5001` would set `Settings.server.port`
    Environment::with_prefix("app")
        .separator("__")
        .try_parsing(true)
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let settings: Settings = with_defaults(&run_mode)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(app_environment())
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    #[cfg(test)]
    pub fn new_for_test() -> Result<Self, ConfigError> {
        with_defaults("test")?
            .set_default("database.url", "sqlite::memory:")?
            .set_default("database.max_connections", 1)?
            .set_default("hashing.memory_kib", 64)?
            .set_default("hashing.iterations", 1)?
            .build()?
            .try_deserialize()
    }

    /// Rejects values that would make the service unusable or insecure.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_ttl("auth.access_token_ttl_secs", self.auth.access_token_ttl_secs)?;
        validate_ttl("auth.refresh_token_ttl_secs", self.auth.refresh_token_ttl_secs)?;
        if self.auth.password_max_len == 0 {
            return Err(ConfigError::Message("auth.password_max_len must be positive".into()));
        }

        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for app in &self.apps {
            if app.id == 0 {
                return Err(ConfigError::Message(format!("app '{}' has reserved id 0", app.name)));
            }
            if app.secret.is_empty() {
                return Err(ConfigError::Message(format!("app '{}' has an empty secret", app.name)));
            }
            if app.secret == DEVELOPMENT_APP_SECRET && self.environment != "development" {
                return Err(ConfigError::Message(format!(
                    "app '{}' uses the development secret in the '{}' environment",
                    app.name, self.environment
                )));
            }
            if !ids.insert(app.id) {
                return Err(ConfigError::Message(format!("app id {} is configured twice", app.id)));
            }
            if !names.insert(app.name.as_str()) {
                return Err(ConfigError::Message(format!("app name '{}' is configured twice", app.name)));
            }
        }

        Ok(())
    }
}

fn validate_ttl(key: &str, secs: i64) -> Result<(), ConfigError> {
    if secs <= 0 {
        return Err(ConfigError::Message(format!("{key} must be positive")));
    }
    if secs > MAX_TTL_SECS {
        return Err(ConfigError::Message(format!("{key} must not exceed {MAX_TTL_SECS}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Tests below mutate process-wide environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn from_test_environment() -> Result<Settings, ConfigError> {
        with_defaults("test")?
            .add_source(app_environment())
            .build()?
            .try_deserialize()
    }

    fn cleanup_env() {
        env::remove_var("RUN_MODE");
        env::remove_var("APP_SERVER__PORT");
        env::remove_var("APP_DATABASE__URL");
        env::remove_var("APP_AUTH__ACCESS_TOKEN_TTL_SECS");
        env::remove_var("APP_AUTH__PASSWORD_MAX_LEN");
    }

    #[test]
    fn test_settings_defaults() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        cleanup_env();

        let settings = Settings::new_for_test().expect("Failed to load settings");
        assert_eq!(settings.environment, "test");
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.server.workers as usize, num_cpus::get());
        assert_eq!(settings.database.url, "sqlite::memory:");
        assert_eq!(settings.auth.access_ttl(), Duration::hours(1));
        assert_eq!(settings.auth.refresh_ttl(), Duration::days(30));
        assert_eq!(settings.auth.password_max_len, 72);
        assert!(settings.apps.is_empty());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_environment_override() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        cleanup_env();

        env::set_var("APP_SERVER__PORT", "9000");
        env::set_var("APP_DATABASE__URL", "sqlite:///var/lib/sso/sso.db");
        env::set_var("APP_AUTH__ACCESS_TOKEN_TTL_SECS", "900");

        let settings = from_test_environment().expect("Failed to load settings");
        cleanup_env();

        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.database.url, "sqlite:///var/lib/sso/sso.db");
        assert_eq!(settings.auth.access_ttl(), Duration::minutes(15));
    }

    #[test]
    fn test_invalid_port() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        cleanup_env();

        env::set_var("APP_SERVER__PORT", "invalid");
        let result = from_test_environment();
        cleanup_env();

        assert!(result.is_err(), "Expected error for invalid port");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        cleanup_env();

        let mut settings = Settings::new_for_test().unwrap();
        settings.auth.access_token_ttl_secs = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::new_for_test().unwrap();
        settings.apps.push(App {
            id: 0,
            name: "reserved".into(),
            secret: "s".into(),
        });
        assert!(settings.validate().is_err());

        let mut settings = Settings::new_for_test().unwrap();
        settings.apps.push(App {
            id: 1,
            name: "no-secret".into(),
            secret: String::new(),
        });
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_oversized_ttl() {
        let mut settings = Settings::new_for_test().unwrap();
        settings.auth.refresh_token_ttl_secs = 10_000_000_000_000;
        assert!(settings.validate().is_err());

        let mut settings = Settings::new_for_test().unwrap();
        settings.auth.access_token_ttl_secs = MAX_TTL_SECS + 1;
        assert!(settings.validate().is_err());

        let mut settings = Settings::new_for_test().unwrap();
        settings.auth.refresh_token_ttl_secs = MAX_TTL_SECS;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_duplicate_apps() {
        let app = |id: i32, name: &str| App {
            id,
            name: name.into(),
            secret: "s3cret".into(),
        };

        let mut settings = Settings::new_for_test().unwrap();
        settings.apps = vec![app(1, "web"), app(1, "mobile")];
        assert!(settings.validate().is_err());

        let mut settings = Settings::new_for_test().unwrap();
        settings.apps = vec![app(1, "web"), app(2, "web")];
        assert!(settings.validate().is_err());

        let mut settings = Settings::new_for_test().unwrap();
        settings.apps = vec![app(1, "web"), app(2, "mobile")];
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_development_secret_only_in_development() {
        let dev_app = App {
            id: 1,
            name: "dev-console".into(),
            secret: DEVELOPMENT_APP_SECRET.into(),
        };

        let mut settings = Settings::new_for_test().unwrap();
        settings.apps.push(dev_app.clone());
        for environment in ["production", "staging", "test"] {
            settings.environment = environment.into();
            assert!(settings.validate().is_err(), "accepted in {environment}");
        }

        settings.environment = "development".into();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_production_run_mode_provisions_no_sample_apps() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        cleanup_env();

        env::set_var("RUN_MODE", "production");
        let settings = Settings::new();
        cleanup_env();

        let settings = settings.expect("Failed to load production settings");
        assert_eq!(settings.environment, "production");
        assert!(settings
            .apps
            .iter()
            .all(|app| app.secret != DEVELOPMENT_APP_SECRET));
    }
}
