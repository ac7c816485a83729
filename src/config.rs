use anyhow::Context;
use tracing::Level;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub database_url: Option<String>,
    pub max_connections: Option<String>,
    pub log_level: String,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            max_connections: lookup("MARKS_DB_MAX_CONNECTIONS")
                .filter(|raw| !raw.trim().is_empty()),
            log_level: lookup("MARKS_LOG_LEVEL")
                .filter(|level| !level.trim().is_empty())
                .unwrap_or_else(|| "info".to_string()),
        })
    }

    pub fn database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set to a Postgres instance for this command")
    }

    /// Pool size, parsed only when a command opens the database.
    pub fn max_connections(&self) -> anyhow::Result<u32> {
        match self.max_connections.as_deref() {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("MARKS_DB_MAX_CONNECTIONS must be a number, got '{raw}'")),
            None => Ok(DEFAULT_MAX_CONNECTIONS),
        }
    }

    pub fn level(&self) -> Option<Level> {
        match self.log_level.to_ascii_lowercase().as_str() {
            "trace" => Some(Level::TRACE),
            "debug" => Some(Level::DEBUG),
            "info" => Some(Level::INFO),
            "warn" | "warning" => Some(Level::WARN),
            "error" => Some(Level::ERROR),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> anyhow::Result<Settings> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let settings = settings(&[]).unwrap();
        assert_eq!(settings.max_connections().unwrap(), 5);
        assert_eq!(settings.level(), Some(Level::INFO));
        assert!(settings.database_url().is_err());
    }

    #[test]
    fn reads_overrides() {
        let settings = settings(&[
            ("DATABASE_URL", "postgres://localhost/marks"),
            ("MARKS_DB_MAX_CONNECTIONS", "12"),
            ("MARKS_LOG_LEVEL", "Warning"),
        ])
        .unwrap();
        assert_eq!(settings.database_url().unwrap(), "postgres://localhost/marks");
        assert_eq!(settings.max_connections().unwrap(), 12);
        assert_eq!(settings.level(), Some(Level::WARN));
    }

    #[test]
    fn bad_pool_size_fails_only_when_connecting() {
        let settings = settings(&[("MARKS_DB_MAX_CONNECTIONS", "many")]).unwrap();
        assert_eq!(settings.level(), Some(Level::INFO));
        let err = settings.max_connections().unwrap_err();
        assert!(err.to_string().contains("many"));
    }
}
