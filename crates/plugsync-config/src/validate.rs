//! Post-merge configuration validation.

use std::collections::HashSet;

use crate::error::{ConfigError, ConfigResult};
use crate::types::{Config, PROVIDER_NAMES};

/// Validate a fully merged configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_node(config)?;
    validate_providers(config)?;
    validate_downloads(config)?;
    validate_reconcile(config)?;
    validate_logging(config)?;
    validate_preinstall(config)?;
    Ok(())
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_owned(),
        message: message.into(),
    }
}

fn require_http_url(field: &str, value: &str) -> ConfigResult<()> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(invalid(
            field,
            format!("'{value}' is not an http(s) URL"),
        ))
    }
}

fn validate_node(config: &Config) -> ConfigResult<()> {
    if config.node.name.trim().is_empty() {
        return Err(invalid("node.name", "node name must not be empty"));
    }
    if config.node.namespace.trim().is_empty() {
        return Err(invalid("node.namespace", "namespace must not be empty"));
    }
    Ok(())
}

fn validate_providers(config: &Config) -> ConfigResult<()> {
    let p = &config.providers;

    if p.order.is_empty() {
        return Err(invalid(
            "providers.order",
            "at least one metadata provider is required",
        ));
    }

    let mut seen = HashSet::new();
    for name in &p.order {
        if !PROVIDER_NAMES.contains(&name.as_str()) {
            return Err(invalid(
                "providers.order",
                format!(
                    "unknown provider '{name}'; expected one of: {}",
                    PROVIDER_NAMES.join(", ")
                ),
            ));
        }
        if !seen.insert(name.as_str()) {
            return Err(invalid(
                "providers.order",
                format!("provider '{name}' listed twice"),
            ));
        }
    }

    if seen.contains("core") && p.core_dir.is_none() {
        return Err(invalid(
            "providers.core_dir",
            "required when 'core' is in providers.order",
        ));
    }

    if seen.contains("cloud") {
        match &p.cloud.api_base {
            Some(base) => require_http_url("providers.cloud.api_base", base)?,
            None => {
                return Err(invalid(
                    "providers.cloud.api_base",
                    "required when 'cloud' is in providers.order",
                ));
            },
        }
    }

    if seen.contains("catalog") {
        require_http_url("providers.catalog.api_base", &p.catalog.api_base)?;
    }

    if p.sweep_interval_secs == 0 {
        return Err(invalid(
            "providers.sweep_interval_secs",
            "sweep interval must be greater than zero",
        ));
    }
    if p.catalog.timeout_secs == 0 {
        return Err(invalid(
            "providers.catalog.timeout_secs",
            "timeout must be greater than zero",
        ));
    }
    if p.cloud.timeout_secs == 0 {
        return Err(invalid(
            "providers.cloud.timeout_secs",
            "timeout must be greater than zero",
        ));
    }

    Ok(())
}

fn validate_downloads(config: &Config) -> ConfigResult<()> {
    let d = &config.downloads;
    require_http_url("downloads.base_url", &d.base_url)?;
    if d.max_archive_bytes == 0 {
        return Err(invalid(
            "downloads.max_archive_bytes",
            "archive size limit must be greater than zero",
        ));
    }
    if d.timeout_secs == 0 {
        return Err(invalid(
            "downloads.timeout_secs",
            "timeout must be greater than zero",
        ));
    }
    Ok(())
}

fn validate_reconcile(config: &Config) -> ConfigResult<()> {
    let r = &config.reconcile;
    if r.timeout_secs == 0 {
        return Err(invalid(
            "reconcile.timeout_secs",
            "timeout must be greater than zero",
        ));
    }
    if r.status_retries == 0 {
        return Err(invalid(
            "reconcile.status_retries",
            "at least one status write attempt is required",
        ));
    }
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let l = &config.logging;
    if !matches!(
        l.level.as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        return Err(invalid(
            "logging.level",
            format!(
                "invalid level '{}'; expected one of: trace, debug, info, warn, error",
                l.level
            ),
        ));
    }
    if !matches!(l.format.as_str(), "pretty" | "compact" | "json") {
        return Err(invalid(
            "logging.format",
            format!(
                "invalid format '{}'; expected one of: pretty, compact, json",
                l.format
            ),
        ));
    }
    Ok(())
}

fn validate_preinstall(config: &Config) -> ConfigResult<()> {
    for (i, entry) in config.preinstall.iter().enumerate() {
        if entry.id.trim().is_empty() {
            return Err(invalid(
                &format!("preinstall[{i}].id"),
                "plugin id must not be empty",
            ));
        }
        if let Some(url) = &entry.url {
            require_http_url(&format!("preinstall[{i}].url"), url)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::types::PreinstallEntry;

    fn valid() -> Config {
        Config::default()
    }

    fn field_of(result: ConfigResult<()>) -> String {
        match result {
            Err(ConfigError::ValidationError { field, .. }) => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn defaults_are_valid() {
        assert!(validate(&valid()).is_ok());
    }

    #[test]
    fn core_requires_dir() {
        let mut config = valid();
        config.providers.order.insert(1, "core".into());
        assert_eq!(field_of(validate(&config)), "providers.core_dir");

        config.providers.core_dir = Some(PathBuf::from("/usr/share/plugsync/core"));
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn unknown_and_duplicate_providers() {
        let mut config = valid();
        config.providers.order = vec!["local".into(), "gcom".into()];
        assert_eq!(field_of(validate(&config)), "providers.order");

        config.providers.order = vec!["local".into(), "local".into()];
        assert_eq!(field_of(validate(&config)), "providers.order");

        config.providers.order.clear();
        assert_eq!(field_of(validate(&config)), "providers.order");
    }

    #[test]
    fn cloud_requires_api_base() {
        let mut config = valid();
        config.providers.order.push("cloud".into());
        assert_eq!(field_of(validate(&config)), "providers.cloud.api_base");

        config.providers.cloud.api_base = Some("https://stack.example.com/api".into());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn zero_status_retries_rejected() {
        let mut config = valid();
        config.reconcile.status_retries = 0;
        assert_eq!(field_of(validate(&config)), "reconcile.status_retries");
    }

    #[test]
    fn bad_logging() {
        let mut config = valid();
        config.logging.format = "xml".into();
        assert_eq!(field_of(validate(&config)), "logging.format");
    }

    #[test]
    fn preinstall_entries() {
        let mut config = valid();
        config.preinstall.push(PreinstallEntry {
            id: "grafana-clock-panel".into(),
            version: "2.1.0".into(),
            url: None,
        });
        assert!(validate(&config).is_ok());

        config.preinstall.push(PreinstallEntry {
            id: "x".into(),
            version: String::new(),
            url: Some("ftp://example.com/x.tgz".into()),
        });
        assert_eq!(field_of(validate(&config)), "preinstall[1].url");
    }
}
