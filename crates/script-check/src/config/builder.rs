//! Configuration builder

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::Error;

const DEFAULT_LOG_LEVEL: &str = "warn";

/// Resolved CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Object names a script may not drop, lowercased.
    pub protected_objects: HashSet<String>,
    pub format: OutputFormat,
    pub observability: ObservabilityConfig,
}

impl Config {
    #[must_use]
    pub const fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// How command results are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(Error::Config(format!(
                "Unknown output format '{other}', expected 'text' or 'json'"
            ))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Json => "json",
        })
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub json_logs: bool,
}

/// Configuration builder with fluent API
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    protected_objects: Vec<String>,
    format: OutputFormat,
    observability: ObservabilityConfig,
}

impl ConfigBuilder {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            protected_objects: Vec::new(),
            format: OutputFormat::Text,
            observability: ObservabilityConfig {
                log_level: String::new(),
                json_logs: false,
            },
        }
    }

    /// Replace the protected object list.
    #[must_use]
    pub fn protected_objects<I, S>(mut self, objects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protected_objects = objects.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub const fn format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn log_level(mut self, level: String) -> Self {
        self.observability.log_level = level;
        self
    }

    #[must_use]
    pub const fn json_logs(mut self, enabled: bool) -> Self {
        self.observability.json_logs = enabled;
        self
    }

    pub fn build(self) -> crate::Result<Config> {
        let protected_objects = self
            .protected_objects
            .iter()
            .map(|name| name.trim().to_lowercase())
            .filter(|name| !name.is_empty())
            .collect();

        let log_level = if self.observability.log_level.is_empty() {
            DEFAULT_LOG_LEVEL.to_string()
        } else {
            self.observability.log_level
        };

        Ok(Config {
            protected_objects,
            format: self.format,
            observability: ObservabilityConfig {
                log_level,
                json_logs: self.observability.json_logs,
            },
        })
    }
}

/// Split a comma-separated list, dropping empty entries.
pub(crate) fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = ConfigBuilder::new().build().unwrap();
        assert!(config.protected_objects.is_empty());
        assert_eq!(config.format, OutputFormat::Text);
        assert_eq!(config.observability.log_level, "warn");
        assert!(!config.observability.json_logs);
    }

    #[test]
    fn test_protected_objects_are_normalized() {
        let config = Config::builder()
            .protected_objects(["  Reserved_View ", "", "main.Audit"])
            .build()
            .unwrap();
        let expected: HashSet<String> = ["reserved_view".to_string(), "main.audit".to_string()].into();
        assert_eq!(config.protected_objects, expected);
    }

    #[test]
    fn test_later_setter_wins() {
        let config = ConfigBuilder::new()
            .format(OutputFormat::Json)
            .format(OutputFormat::Text)
            .log_level("debug".into())
            .json_logs(true)
            .build()
            .unwrap();
        assert_eq!(config.format, OutputFormat::Text);
        assert_eq!(config.observability.log_level, "debug");
        assert!(config.observability.json_logs);
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!(" text ".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert!("yaml".parse::<OutputFormat>().unwrap_err().is_config());
        assert_eq!(OutputFormat::Json.to_string(), "json");
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("a, b,,c ,"), vec!["a", "b", "c"]);
        assert!(split_list(" , ").is_empty());
    }
}
