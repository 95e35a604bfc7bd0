//! Configuration parsing
//!
//! TOML (primary) and JSON formats.

use contracts::{ContractError, PipelineBlueprint};

/// Configuration file format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML (preferred)
    Toml,
    /// JSON
    Json,
}

impl ConfigFormat {
    /// Infer the format from a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Parse TOML configuration
pub fn parse_toml(content: &str) -> Result<PipelineBlueprint, ContractError> {
    toml::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// Parse JSON configuration
pub fn parse_json(content: &str) -> Result<PipelineBlueprint, ContractError> {
    serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// Parse configuration in the given format
pub fn parse(content: &str, format: ConfigFormat) -> Result<PipelineBlueprint, ContractError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::ChannelType;

    #[test]
    fn test_parse_toml_minimal() {
        let content = r#"
[algorithm]
name = "summer"

[engine]
max_buffer_size = 20

[[engine.channels]]
name = "sum"

[[engine.channels]]
name = "delta"
message_type = "binary_video"
enabled = false

[engine.cpi]
cpi_span = 8
drop_incomplete_cpi = true

[[sources]]
channel = "sum"
prf_hz = 500.0
"#;
        let result = parse_toml(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert_eq!(bp.algorithm.name, "summer");
        assert_eq!(bp.engine.max_buffer_size, 20);
        assert_eq!(bp.engine.channels.len(), 2);
        assert_eq!(bp.engine.channels[1].message_type, ChannelType::BinaryVideo);
        assert!(!bp.engine.channels[1].enabled);
        assert_eq!(bp.engine.cpi_span(), Some(8));
        assert!(bp.engine.cpi.as_ref().unwrap().drop_incomplete_cpi);
        assert_eq!(bp.sources[0].prf_hz, 500.0);
    }

    #[test]
    fn test_parse_json_minimal() {
        let content = r#"{
            "algorithm": { "name": "passthrough" },
            "engine": {
                "channels": [{ "name": "input1" }],
                "wrap_threshold": 65536
            }
        }"#;
        let result = parse_json(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert_eq!(bp.engine.wrap_threshold, Some(65536));
        assert!(bp.sources.is_empty());
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let content = "invalid toml [[[";
        let result = parse_toml(content);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ContractError::ConfigParse { .. }));
    }

    #[test]
    fn test_unknown_message_type() {
        let content = r#"
[algorithm]
name = "x"

[[engine.channels]]
name = "a"
message_type = "sonar"
"#;
        assert!(matches!(
            parse_toml(content),
            Err(ContractError::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ConfigFormat::from_extension("toml"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("TOML"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("json"),
            Some(ConfigFormat::Json)
        );
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
