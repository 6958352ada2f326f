//! Typed server configuration, loaded once at startup from environment
//! variables (and validated before the server begins serving).

use thiserror::Error;

/// Errors raised while loading or validating [`ServerConfig`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A required environment variable was not set.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
    /// A variable was set but could not be parsed into its expected type.
    #[error("invalid value for {name}: {value}")]
    Invalid {
        /// Variable name.
        name: &'static str,
        /// The value that failed to parse.
        value: String,
    },
    /// A value was parseable but failed a semantic check (e.g. ttl <= 0).
    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// Process-wide configuration for the server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// ADO organization name.
    pub organization: String,
    /// ADO project name.
    pub project: String,
    /// ADO REST API version string, e.g. `"7.1"`.
    pub api_version: String,
    /// Default TTL for newly created query handles, in seconds.
    pub handle_ttl_seconds: u64,
    /// Default page size for ADO batch field fetches (capped at 200 by ADO).
    pub default_page_size: usize,
    /// Default number of items included in a query/bulk preview.
    pub preview_count: usize,
    /// Bounded concurrent fan-out for staleness analysis during query execution.
    pub fan_out: usize,
    /// Bounded concurrency for per-item bulk action execution.
    pub bulk_concurrency: usize,
    /// Author display-name substrings treated as automated when classifying revisions.
    pub automation_patterns: Vec<String>,
    /// Extra field reference names treated as substantive, beyond the built-in set.
    pub substantive_fields: Vec<String>,
    /// Minimum confidence required for an AI-assisted action to apply.
    pub min_confidence_score: f64,
}

impl ServerConfig {
    /// Loads configuration from environment variables, applying defaults for
    /// everything but `organization` and `project`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let organization = require_env("ADO_ORGANIZATION")?;
        let project = require_env("ADO_PROJECT")?;
        let api_version = optional_env("ADO_API_VERSION").unwrap_or_else(|| "7.1".to_string());
        let handle_ttl_seconds = parse_env("ADO_HANDLE_TTL_SECONDS", 3600)?;
        let default_page_size = parse_env("ADO_DEFAULT_PAGE_SIZE", 200)?;
        let preview_count = parse_env("ADO_PREVIEW_COUNT", 10)?;
        let fan_out = parse_env("ADO_FAN_OUT", 16)?;
        let bulk_concurrency = parse_env("ADO_BULK_CONCURRENCY", 8)?;
        let automation_patterns = list_env("ADO_AUTOMATION_PATTERNS");
        let substantive_fields = list_env("ADO_SUBSTANTIVE_FIELDS");
        let min_confidence_score = parse_env_f64("ADO_MIN_CONFIDENCE_SCORE", 0.0)?;

        let config = ServerConfig {
            organization,
            project,
            api_version,
            handle_ttl_seconds,
            default_page_size,
            preview_count,
            fan_out,
            bulk_concurrency,
            automation_patterns,
            substantive_fields,
            min_confidence_score,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.organization.trim().is_empty() {
            return Err(ConfigError::Validation("organization must not be empty".into()));
        }
        if self.project.trim().is_empty() {
            return Err(ConfigError::Validation("project must not be empty".into()));
        }
        if self.handle_ttl_seconds == 0 {
            return Err(ConfigError::Validation("handle_ttl_seconds must be > 0".into()));
        }
        if self.default_page_size == 0 || self.default_page_size > 200 {
            return Err(ConfigError::Validation(
                "default_page_size must be in 1..=200".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_confidence_score) {
            return Err(ConfigError::Validation(
                "min_confidence_score must be in 0.0..=1.0".into(),
            ));
        }
        Ok(())
    }
}

fn require_env(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn parse_env(name: &'static str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

fn parse_env_f64(name: &'static str, default: f64) -> Result<f64, ConfigError> {
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

fn list_env(name: &str) -> Vec<String> {
    std::env::var(name)
        .ok()
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clear_env() {
        for var in [
            "ADO_ORGANIZATION",
            "ADO_PROJECT",
            "ADO_API_VERSION",
            "ADO_HANDLE_TTL_SECONDS",
            "ADO_DEFAULT_PAGE_SIZE",
            "ADO_PREVIEW_COUNT",
            "ADO_FAN_OUT",
            "ADO_BULK_CONCURRENCY",
            "ADO_AUTOMATION_PATTERNS",
            "ADO_SUBSTANTIVE_FIELDS",
            "ADO_MIN_CONFIDENCE_SCORE",
        ] {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn missing_organization_is_reported() {
        clear_env();
        let err = ServerConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("ADO_ORGANIZATION")));
    }

    #[test]
    fn defaults_apply_when_optional_vars_absent() {
        clear_env();
        std::env::set_var("ADO_ORGANIZATION", "contoso");
        std::env::set_var("ADO_PROJECT", "widgets");
        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.handle_ttl_seconds, 3600);
        assert_eq!(config.fan_out, 16);
        assert_eq!(config.bulk_concurrency, 8);
        clear_env();
    }

    #[test]
    fn zero_ttl_is_rejected() {
        clear_env();
        std::env::set_var("ADO_ORGANIZATION", "contoso");
        std::env::set_var("ADO_PROJECT", "widgets");
        std::env::set_var("ADO_HANDLE_TTL_SECONDS", "0");
        let err = ServerConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        clear_env();
    }

    #[test]
    fn automation_patterns_parse_as_csv() {
        clear_env();
        std::env::set_var("ADO_ORGANIZATION", "contoso");
        std::env::set_var("ADO_PROJECT", "widgets");
        std::env::set_var("ADO_AUTOMATION_PATTERNS", "bot, Auto Build , CI");
        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.automation_patterns, vec!["bot", "Auto Build", "CI"]);
        clear_env();
    }
}
