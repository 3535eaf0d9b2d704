use eyre::{Result, WrapErr};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub admin: AdminConfig,
}

impl Config {
    pub fn load(file_name: impl AsRef<Path>) -> Result<Config> {
        let file_name = file_name.as_ref();
        let content = std::fs::read_to_string(file_name)
            .wrap_err_with(|| format!("cannot load configuration file {}", file_name.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Config> {
        toml::from_str(content).wrap_err("cannot parse configuration file")
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            url: "mysql://localhost/fyp".to_owned(),
            max_connections: 5,
            acquire_timeout_secs: 5,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Deadline applied to every administrative operation.
    pub operation_timeout_secs: u64,
    /// Student accounts are disabled once their semester has been archived.
    pub deactivate_students_on_archive: bool,
    pub page_size: usize,
}

impl AdminConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        AdminConfig {
            operation_timeout_secs: 10,
            deactivate_students_on_archive: true,
            page_size: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.database.max_connections, 5);
        assert!(config.admin.deactivate_students_on_archive);
        assert_eq!(config.admin.operation_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::parse(
            r#"
            [database]
            url = "sqlite://fyp.db"

            [admin]
            deactivate_students_on_archive = false
            page_size = 25
            "#,
        )
        .unwrap();
        assert_eq!(config.database.url, "sqlite://fyp.db");
        assert_eq!(config.database.acquire_timeout_secs, 5);
        assert!(!config.admin.deactivate_students_on_archive);
        assert_eq!(config.admin.page_size, 25);
        assert_eq!(config.admin.operation_timeout_secs, 10);
    }

    #[test]
    fn test_invalid() {
        assert!(Config::parse("[admin]\npage_size = \"many\"").is_err());
    }
}
