//! Environment variable loading for configuration

use std::env;

use super::builder::{ConfigBuilder, OutputFormat, split_list};
use crate::Result;

/// Environment variable names
mod vars {
    pub const SCRIPT_CHECK_PROTECTED_OBJECTS: &str = "SCRIPT_CHECK_PROTECTED_OBJECTS";
    pub const SCRIPT_CHECK_FORMAT: &str = "SCRIPT_CHECK_FORMAT";
    pub const RUST_LOG: &str = "RUST_LOG";
    pub const SCRIPT_CHECK_JSON_LOGS: &str = "SCRIPT_CHECK_JSON_LOGS";
}

/// Load configuration from environment variables
pub fn load_from_env(mut builder: ConfigBuilder) -> Result<ConfigBuilder> {
    if let Ok(objects) = env::var(vars::SCRIPT_CHECK_PROTECTED_OBJECTS) {
        builder = builder.protected_objects(split_list(&objects));
    }

    if let Ok(format) = env::var(vars::SCRIPT_CHECK_FORMAT) {
        builder = builder.format(format.parse::<OutputFormat>()?);
    }

    if let Ok(level) = env::var(vars::RUST_LOG) {
        builder = builder.log_level(level);
    }

    if let Ok(val) = env::var(vars::SCRIPT_CHECK_JSON_LOGS) {
        builder = builder.json_logs(parse_bool(&val));
    }

    Ok(builder)
}

fn parse_bool(s: &str) -> bool {
    matches!(s.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const ALL_VARS: &[&str] = &[
        vars::SCRIPT_CHECK_PROTECTED_OBJECTS,
        vars::SCRIPT_CHECK_FORMAT,
        vars::RUST_LOG,
        vars::SCRIPT_CHECK_JSON_LOGS,
    ];

    /// Run `f` with exactly `vars` set among the variables this module reads.
    fn with_env_vars<F, R>(vars: &[(&str, &str)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = ENV_MUTEX.lock().unwrap();

        let old_values: Vec<_> = ALL_VARS.iter().map(|k| (*k, env::var(k).ok())).collect();

        for key in ALL_VARS {
            // SAFETY: We hold a mutex lock to ensure no concurrent modifications
            unsafe { env::remove_var(key) };
        }
        for (key, value) in vars {
            // SAFETY: We hold a mutex lock to ensure no concurrent modifications
            unsafe { env::set_var(key, value) };
        }

        let result = f();

        for (key, old_value) in old_values {
            match old_value {
                // SAFETY: We hold a mutex lock to ensure no concurrent modifications
                Some(v) => unsafe { env::set_var(key, v) },
                None => unsafe { env::remove_var(key) },
            }
        }

        result
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("true"));
        assert!(parse_bool("TRUE"));
        assert!(parse_bool("1"));
        assert!(parse_bool("yes"));
        assert!(parse_bool("on"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool(""));
    }

    #[test]
    fn test_no_env_leaves_builder_alone() {
        let config = with_env_vars(&[], || {
            load_from_env(ConfigBuilder::new().format(OutputFormat::Json))
                .unwrap()
                .build()
                .unwrap()
        });
        assert_eq!(config.format, OutputFormat::Json);
        assert!(config.protected_objects.is_empty());
    }

    #[test]
    fn test_env_overrides_builder() {
        let config = with_env_vars(
            &[
                (vars::SCRIPT_CHECK_PROTECTED_OBJECTS, "reserved_view, main.audit"),
                (vars::SCRIPT_CHECK_FORMAT, "json"),
                (vars::RUST_LOG, "trace"),
                (vars::SCRIPT_CHECK_JSON_LOGS, "yes"),
            ],
            || {
                load_from_env(ConfigBuilder::new().protected_objects(["from_file"]))
                    .unwrap()
                    .build()
                    .unwrap()
            },
        );
        assert_eq!(config.protected_objects.len(), 2);
        assert!(config.protected_objects.contains("main.audit"));
        assert!(!config.protected_objects.contains("from_file"));
        assert_eq!(config.format, OutputFormat::Json);
        assert_eq!(config.observability.log_level, "trace");
        assert!(config.observability.json_logs);
    }

    #[test]
    fn test_invalid_format_env() {
        let result = with_env_vars(&[(vars::SCRIPT_CHECK_FORMAT, "csv")], || {
            load_from_env(ConfigBuilder::new())
        });
        assert!(result.unwrap_err().is_config());
    }
}
