use anyhow::{Context, anyhow};
use serde::Deserialize;
use std::path::{Path, PathBuf};

mod authorize_config;
mod database_config;
mod logs_config;
mod server_config;
mod tasks_config;

pub use authorize_config::AuthorizeConfig;
pub use database_config::DatabaseConfig;
pub use logs_config::LogsConfig;
pub use server_config::ServerConfig;
pub use tasks_config::{CacheConfig, MaintenanceConfig, PushConfig, QueueConfig};

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logs: LogsConfig,
    pub authorize: AuthorizeConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
}

/// Relative paths are resolved against the working directory.
pub(crate) fn resolve_path(value: &str) -> anyhow::Result<PathBuf> {
    let path = Path::new(value);
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let current_dir = std::env::current_dir().context("Failed to read current directory")?;
    Ok(current_dir.join(path))
}

pub fn parse_config_path(mut args: impl Iterator<Item = String>) -> anyhow::Result<PathBuf> {
    while let Some(arg) = args.next() {
        if arg == "-c" || arg == "--config" {
            return args
                .next()
                .map(PathBuf::from)
                .ok_or_else(|| anyhow!("Error: Please specify path string for -c argument."));
        }
    }
    Err(anyhow!(
        "Error: Please specify configuration file argument. Usage: -c <config_file>"
    ))
}

pub fn parse(content: &str) -> anyhow::Result<Config> {
    toml::from_str(content).with_context(|| {
        "Error: Failed to parse configuration file.\n\
        Please check the file syntax is valid TOML syntax"
    })
}

pub fn load(path: &Path) -> anyhow::Result<Config> {
    if !path.is_file() {
        return Err(anyhow!(
            "Error: Configuration file not found or invalid.\n\
        Please make sure that the configuration file exists and is a valid TOML file.\n\
        Expected file path: {:?}",
            path
        ));
    }
    let content = std::fs::read_to_string(path).with_context(|| {
        "Error: Failed to read configuration file.\n\
        Please check the file path and file permissions, and make sure the file is valid accessible"
    })?;
    parse(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tracing::Level;

    const MINIMAL: &str = r#"
[server]
host = "127.0.0.1"
port = 8080

[database]
path = "data/devicesync.db"

[logs]
level = "debug"

[authorize]
secret = "jwt-secret"
task_secret = "task-secret"
"#;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = parse(MINIMAL).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.logs.level, Level::DEBUG);
        assert_eq!(config.authorize.issuer, "devicesync");
        assert_eq!(config.cache.ttl(), Duration::from_secs(3600));
        assert_eq!(config.queue.max_attempts, 5);
        assert!(config.push.endpoint.is_none());
        assert_eq!(config.maintenance.event_max_age(), None);
        assert!(config.database.parse_path().unwrap().ends_with("data/devicesync.db"));
    }

    #[test]
    fn optional_sections_are_read() {
        let content = format!(
            "{MINIMAL}\n[push]\nendpoint = \"https://push.example.com/send\"\nretries = 1\n\n\
             [maintenance]\ncache_interval_secs = 60\nevent_max_age_secs = 86400\n"
        );
        let config = parse(&content).unwrap();
        assert_eq!(config.push.endpoint.as_deref(), Some("https://push.example.com/send"));
        assert_eq!(config.push.retries, 1);
        assert_eq!(config.maintenance.interval(), Duration::from_secs(60));
        assert_eq!(
            config.maintenance.event_max_age(),
            Some(Duration::from_secs(86400))
        );
    }

    #[test]
    fn unknown_log_level_is_rejected() {
        assert!(parse(&MINIMAL.replace("debug", "loud")).is_err());
    }

    #[test]
    fn config_path_argument() {
        let args = ["-c", "config.toml"].into_iter().map(String::from);
        assert_eq!(parse_config_path(args).unwrap(), PathBuf::from("config.toml"));
        let args = ["--config"].into_iter().map(String::from);
        assert!(parse_config_path(args).is_err());
        assert!(parse_config_path(std::iter::empty()).is_err());
    }

    #[test]
    fn relative_paths_resolve_against_working_directory() {
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(resolve_path("data/app.db").unwrap(), cwd.join("data/app.db"));
        assert_eq!(resolve_path("/var/app.db").unwrap(), PathBuf::from("/var/app.db"));
    }
}
