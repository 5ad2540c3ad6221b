use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - At least one non-blank key per key-bearing API
/// - Monday token and board id are set
/// - Server port is not 0
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if !config.fireflies.api_keys.iter().any(|k| !k.trim().is_empty()) {
        return Err(ConfigError::ValidationError(
            "fireflies.api_keys must contain at least one key".to_string(),
        ));
    }

    if !config.gemini.api_keys.iter().any(|k| !k.trim().is_empty()) {
        return Err(ConfigError::ValidationError(
            "gemini.api_keys must contain at least one key".to_string(),
        ));
    }

    if config.monday.api_token.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "monday.api_token must be set".to_string(),
        ));
    }

    if config.monday.board_id <= 0 {
        return Err(ConfigError::ValidationError(
            "monday.board_id must be a positive board id".to_string(),
        ));
    }

    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.pipeline.max_items_per_run == 0 {
        return Err(ConfigError::ValidationError(
            "pipeline.max_items_per_run must be at least 1".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    fn valid_config() -> Config {
        load_config_from_str(
            r#"
[fireflies]
api_keys = ["ff-key"]

[gemini]
api_keys = ["gm-key"]

[monday]
api_token = "mn-token"
board_id = 42
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_validate_blank_keys_fail() {
        let mut config = valid_config();
        config.fireflies.api_keys = vec!["   ".to_string()];
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validate_missing_monday_token_fails() {
        let mut config = valid_config();
        config.monday.api_token = String::new();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validate_bad_board_id_fails() {
        let mut config = valid_config();
        config.monday.board_id = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = valid_config();
        config.server.port = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_item_cap_fails() {
        let mut config = valid_config();
        config.pipeline.max_items_per_run = 0;
        assert!(validate_config(&config).is_err());
    }
}
