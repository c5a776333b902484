//! Configuration validation rules.

use super::schema::Config;

/// Validate configuration and return aggregated validation errors.
pub fn validate_config(config: &Config) -> crate::Result<()> {
    let mut errors = Vec::new();

    if config.agent.model.trim().is_empty() {
        errors.push("agent.model must not be empty".to_string());
    }
    if config.agent.max_tokens == 0 {
        errors.push("agent.max_tokens must be > 0".to_string());
    }
    if !(0.0..=2.0).contains(&config.agent.temperature) {
        errors.push("agent.temperature must be in [0.0, 2.0]".to_string());
    }

    if config.database.path.trim().is_empty() {
        errors.push("database.path must not be empty".to_string());
    }
    if config.database.max_connections == 0 {
        errors.push("database.max_connections must be > 0".to_string());
    }

    if config.server.host.trim().is_empty() {
        errors.push("server.host must not be empty".to_string());
    }
    if config.server.port == 0 {
        errors.push("server.port must be > 0".to_string());
    }

    let level = config.logging.level.to_ascii_lowercase();
    if !["trace", "debug", "info", "warn", "error", "off"].contains(&level.as_str()) {
        errors.push(format!(
            "logging.level must be one of trace, debug, info, warn, error, off (got {})",
            config.logging.level
        ));
    }
    let format = config.logging.format.to_ascii_lowercase();
    if format != "text" && format != "json" {
        errors.push(format!(
            "logging.format must be text or json (got {})",
            config.logging.format
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(crate::Error::Validation(errors.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_defaults() {
        validate_config(&Config::default()).unwrap();
    }

    #[test]
    fn test_validate_aggregates_errors() {
        let mut config = Config::default();
        config.agent.max_tokens = 0;
        config.database.path = " ".to_string();

        let err = validate_config(&config).unwrap_err().to_string();
        assert!(err.contains("agent.max_tokens"));
        assert!(err.contains("database.path"));
    }

    #[test]
    fn test_validate_rejects_unknown_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();

        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("logging.format"));
    }
}
