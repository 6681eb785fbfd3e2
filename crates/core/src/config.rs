use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::policy::{SlaPolicy, MAX_RESOLUTION_MINUTES};
use crate::domain::ticket::Priority;
use crate::engine::EscalationEngineConfig;
use crate::escalation::MAX_ESCALATION_LEVEL;

pub const DEFAULT_CONFIG_FILE: &str = "supportdesk.toml";
pub const NESTED_CONFIG_FILE: &str = "config/supportdesk.toml";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub sweep: SweepConfig,
    pub sla: SlaConfig,
    pub notification: NotificationConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SweepConfig {
    pub interval_secs: u64,
    pub soft_deadline_secs: u64,
    pub default_max_level: u32,
    pub conflict_retries: u32,
}

#[derive(Clone, Debug)]
pub struct SlaConfig {
    pub default_response_minutes: i64,
    pub default_resolution_minutes: i64,
}

#[derive(Clone, Debug)]
pub struct NotificationConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: u32,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub sweep_interval_secs: Option<u64>,
    pub sweep_soft_deadline_secs: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://supportdesk.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            sweep: SweepConfig {
                interval_secs: 60,
                soft_deadline_secs: 45,
                default_max_level: crate::escalation::DEFAULT_MAX_LEVEL,
                conflict_retries: crate::tickets::DEFAULT_CONFLICT_RETRIES,
            },
            sla: SlaConfig { default_response_minutes: 60, default_resolution_minutes: 1440 },
            notification: NotificationConfig {
                max_attempts: 5,
                base_delay_ms: 500,
                backoff_multiplier: 2,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl SweepConfig {
    pub fn engine_config(&self) -> EscalationEngineConfig {
        EscalationEngineConfig {
            soft_deadline: i64::try_from(self.soft_deadline_secs)
                .ok()
                .and_then(Duration::try_seconds)
                .unwrap_or(Duration::MAX),
            default_max_level: self.default_max_level,
        }
    }
}

impl SlaConfig {
    /// Policy applied when the table has no entry for a ticket's priority.
    pub fn default_policy(&self) -> SlaPolicy {
        SlaPolicy {
            id: "sla-default".to_string(),
            priority: Priority::Medium,
            response_minutes: self.default_response_minutes,
            resolution_minutes: self.default_resolution_minutes,
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(sweep) = patch.sweep {
            if let Some(interval_secs) = sweep.interval_secs {
                self.sweep.interval_secs = interval_secs;
            }
            if let Some(soft_deadline_secs) = sweep.soft_deadline_secs {
                self.sweep.soft_deadline_secs = soft_deadline_secs;
            }
            if let Some(default_max_level) = sweep.default_max_level {
                self.sweep.default_max_level = default_max_level;
            }
            if let Some(conflict_retries) = sweep.conflict_retries {
                self.sweep.conflict_retries = conflict_retries;
            }
        }

        if let Some(sla) = patch.sla {
            if let Some(minutes) = sla.default_response_minutes {
                self.sla.default_response_minutes = minutes;
            }
            if let Some(minutes) = sla.default_resolution_minutes {
                self.sla.default_resolution_minutes = minutes;
            }
        }

        if let Some(notification) = patch.notification {
            if let Some(max_attempts) = notification.max_attempts {
                self.notification.max_attempts = max_attempts;
            }
            if let Some(base_delay_ms) = notification.base_delay_ms {
                self.notification.base_delay_ms = base_delay_ms;
            }
            if let Some(backoff_multiplier) = notification.backoff_multiplier {
                self.notification.backoff_multiplier = backoff_multiplier;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("SUPPORTDESK_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("SUPPORTDESK_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_number("SUPPORTDESK_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("SUPPORTDESK_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_number("SUPPORTDESK_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SUPPORTDESK_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("SUPPORTDESK_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_number("SUPPORTDESK_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("SUPPORTDESK_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_number("SUPPORTDESK_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("SUPPORTDESK_SWEEP_INTERVAL_SECS") {
            self.sweep.interval_secs = parse_number("SUPPORTDESK_SWEEP_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = read_env("SUPPORTDESK_SWEEP_SOFT_DEADLINE_SECS") {
            self.sweep.soft_deadline_secs =
                parse_number("SUPPORTDESK_SWEEP_SOFT_DEADLINE_SECS", &value)?;
        }
        if let Some(value) = read_env("SUPPORTDESK_SWEEP_DEFAULT_MAX_LEVEL") {
            self.sweep.default_max_level =
                parse_number("SUPPORTDESK_SWEEP_DEFAULT_MAX_LEVEL", &value)?;
        }
        if let Some(value) = read_env("SUPPORTDESK_SWEEP_CONFLICT_RETRIES") {
            self.sweep.conflict_retries =
                parse_number("SUPPORTDESK_SWEEP_CONFLICT_RETRIES", &value)?;
        }

        if let Some(value) = read_env("SUPPORTDESK_SLA_DEFAULT_RESPONSE_MINUTES") {
            self.sla.default_response_minutes =
                parse_number("SUPPORTDESK_SLA_DEFAULT_RESPONSE_MINUTES", &value)?;
        }
        if let Some(value) = read_env("SUPPORTDESK_SLA_DEFAULT_RESOLUTION_MINUTES") {
            self.sla.default_resolution_minutes =
                parse_number("SUPPORTDESK_SLA_DEFAULT_RESOLUTION_MINUTES", &value)?;
        }

        if let Some(value) = read_env("SUPPORTDESK_NOTIFICATION_MAX_ATTEMPTS") {
            self.notification.max_attempts =
                parse_number("SUPPORTDESK_NOTIFICATION_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("SUPPORTDESK_NOTIFICATION_BASE_DELAY_MS") {
            self.notification.base_delay_ms =
                parse_number("SUPPORTDESK_NOTIFICATION_BASE_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("SUPPORTDESK_NOTIFICATION_BACKOFF_MULTIPLIER") {
            self.notification.backoff_multiplier =
                parse_number("SUPPORTDESK_NOTIFICATION_BACKOFF_MULTIPLIER", &value)?;
        }

        let log_level = read_env("SUPPORTDESK_LOGGING_LEVEL")
            .or_else(|| read_env("SUPPORTDESK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("SUPPORTDESK_LOGGING_FORMAT")
            .or_else(|| read_env("SUPPORTDESK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(interval_secs) = overrides.sweep_interval_secs {
            self.sweep.interval_secs = interval_secs;
        }
        if let Some(soft_deadline_secs) = overrides.sweep_soft_deadline_secs {
            self.sweep.soft_deadline_secs = soft_deadline_secs;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_sweep(&self.sweep)?;
        validate_sla(&self.sla)?;
        validate_notification(&self.notification)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// Explicit path if it exists, otherwise the first default location found.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from(NESTED_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_sweep(sweep: &SweepConfig) -> Result<(), ConfigError> {
    if sweep.interval_secs == 0 {
        return Err(ConfigError::Validation(
            "sweep.interval_secs must be greater than zero".to_string(),
        ));
    }

    if sweep.soft_deadline_secs == 0 || sweep.soft_deadline_secs >= sweep.interval_secs {
        return Err(ConfigError::Validation(format!(
            "sweep.soft_deadline_secs must be in range 1..{} (below sweep.interval_secs)",
            sweep.interval_secs
        )));
    }

    if sweep.default_max_level == 0 || sweep.default_max_level > MAX_ESCALATION_LEVEL {
        return Err(ConfigError::Validation(format!(
            "sweep.default_max_level must be in range 1..={MAX_ESCALATION_LEVEL}"
        )));
    }

    Ok(())
}

fn validate_sla(sla: &SlaConfig) -> Result<(), ConfigError> {
    if sla.default_response_minutes <= 0 || sla.default_resolution_minutes <= 0 {
        return Err(ConfigError::Validation(
            "sla.default_response_minutes and sla.default_resolution_minutes must be positive"
                .to_string(),
        ));
    }

    if sla.default_response_minutes > MAX_RESOLUTION_MINUTES
        || sla.default_resolution_minutes > MAX_RESOLUTION_MINUTES
    {
        return Err(ConfigError::Validation(format!(
            "sla.default_response_minutes and sla.default_resolution_minutes must not exceed \
             {MAX_RESOLUTION_MINUTES}"
        )));
    }

    Ok(())
}

fn validate_notification(notification: &NotificationConfig) -> Result<(), ConfigError> {
    if notification.max_attempts == 0 {
        return Err(ConfigError::Validation(
            "notification.max_attempts must be at least 1".to_string(),
        ));
    }

    if notification.backoff_multiplier == 0 {
        return Err(ConfigError::Validation(
            "notification.backoff_multiplier must be at least 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    sweep: Option<SweepPatch>,
    sla: Option<SlaPatch>,
    notification: Option<NotificationPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SweepPatch {
    interval_secs: Option<u64>,
    soft_deadline_secs: Option<u64>,
    default_max_level: Option<u32>,
    conflict_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct SlaPatch {
    default_response_minutes: Option<i64>,
    default_resolution_minutes: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct NotificationPatch {
    max_attempts: Option<u32>,
    base_delay_ms: Option<u64>,
    backoff_multiplier: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_match_documented_values() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.sweep.interval_secs == 60, "sweep interval defaults to 60s")?;
        ensure(config.sweep.soft_deadline_secs == 45, "soft deadline defaults to 45s")?;
        ensure(config.sweep.default_max_level == 3, "default max level is 3")?;
        ensure(config.sla.default_resolution_minutes == 1440, "default resolution is 24h")?;
        ensure(config.notification.max_attempts == 5, "notification attempts default to 5")?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )?;

        let engine = config.sweep.engine_config();
        ensure(engine.soft_deadline.num_seconds() == 45, "engine soft deadline mirrors config")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_SUPPORTDESK_DB", "sqlite://interpolated.db");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("supportdesk.toml");
            fs::write(
                &path,
                r#"
[database]
url = "${TEST_SUPPORTDESK_DB}"

[sweep]
interval_secs = 120
soft_deadline_secs = 90
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://interpolated.db",
                "database url should be interpolated from environment",
            )?;
            ensure(config.sweep.interval_secs == 120, "sweep interval should come from file")?;
            ensure(config.sweep.soft_deadline_secs == 90, "soft deadline should come from file")?;
            Ok(())
        })();

        clear_vars(&["TEST_SUPPORTDESK_DB"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SUPPORTDESK_LOG_LEVEL", "warn");
        env::set_var("SUPPORTDESK_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["SUPPORTDESK_LOG_LEVEL", "SUPPORTDESK_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SUPPORTDESK_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("SUPPORTDESK_NOTIFICATION_MAX_ATTEMPTS", "7");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("supportdesk.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[notification]
max_attempts = 3
base_delay_ms = 250

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.notification.max_attempts == 7, "env should win over file")?;
            ensure(config.notification.base_delay_ms == 250, "file should win over default")?;
            Ok(())
        })();

        clear_vars(&["SUPPORTDESK_DATABASE_URL", "SUPPORTDESK_NOTIFICATION_MAX_ATTEMPTS"]);
        result
    }

    #[test]
    fn soft_deadline_must_fit_inside_interval() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SUPPORTDESK_SWEEP_SOFT_DEADLINE_SECS", "60");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("sweep.soft_deadline_secs")
            );
            ensure(has_message, "validation failure should mention sweep.soft_deadline_secs")
        })();

        clear_vars(&["SUPPORTDESK_SWEEP_SOFT_DEADLINE_SECS"]);
        result
    }

    #[test]
    fn malformed_env_number_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SUPPORTDESK_SWEEP_INTERVAL_SECS", "soon");

        let result = (|| -> Result<(), String> {
            let rejected = matches!(
                AppConfig::load(LoadOptions::default()),
                Err(ConfigError::InvalidEnvOverride { ref key, .. })
                    if key == "SUPPORTDESK_SWEEP_INTERVAL_SECS"
            );
            ensure(rejected, "non-numeric interval should be rejected")
        })();

        clear_vars(&["SUPPORTDESK_SWEEP_INTERVAL_SECS"]);
        result
    }

    #[test]
    fn oversized_resolution_window_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SUPPORTDESK_SLA_DEFAULT_RESOLUTION_MINUTES", "200000000000");

        let result = (|| -> Result<(), String> {
            let rejected = matches!(
                AppConfig::load(LoadOptions::default()),
                Err(ConfigError::Validation(ref message))
                    if message.contains("sla.default_resolution_minutes")
            );
            ensure(rejected, "a resolution window beyond ten years should be rejected")
        })();

        clear_vars(&["SUPPORTDESK_SLA_DEFAULT_RESOLUTION_MINUTES"]);
        result
    }

    #[test]
    fn default_max_level_is_capped() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SUPPORTDESK_SWEEP_DEFAULT_MAX_LEVEL", "4000000000");

        let result = (|| -> Result<(), String> {
            let rejected = matches!(
                AppConfig::load(LoadOptions::default()),
                Err(ConfigError::Validation(ref message))
                    if message.contains("sweep.default_max_level")
            );
            ensure(rejected, "an unbounded default max level should be rejected")
        })();

        clear_vars(&["SUPPORTDESK_SWEEP_DEFAULT_MAX_LEVEL"]);
        result
    }
}
