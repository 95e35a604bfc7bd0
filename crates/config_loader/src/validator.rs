//! Configuration validation
//!
//! Rules:
//! - field-level rules declared on the contract structs (`validator` derive):
//!   positive buffer sizes and CPI span, non-empty names, drop probability in [0, 1]
//! - channel names are unique
//! - every source feeds an existing channel, and no channel is fed twice
//! - source PRF and sample counts are positive

use std::collections::HashSet;

use ::validator::Validate;
use contracts::{ContractError, PipelineBlueprint};

/// Validate a PipelineBlueprint
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    validate_fields(blueprint)?;
    validate_channel_names(blueprint)?;
    validate_source_channels(blueprint)?;
    validate_source_rates(blueprint)?;
    Ok(())
}

/// Derived field-level rules
fn validate_fields(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    blueprint
        .validate()
        .map_err(|e| ContractError::config_validation("blueprint", e.to_string()))
}

/// Channel names must be unique (sources address channels by name)
fn validate_channel_names(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, channel) in blueprint.engine.channels.iter().enumerate() {
        if !seen.insert(channel.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("engine.channels[{idx}].name"),
                format!("duplicate channel name '{}'", channel.name),
            ));
        }
    }
    Ok(())
}

/// Sources must reference configured channels, one source per channel
fn validate_source_channels(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    let mut fed = HashSet::new();
    for (idx, source) in blueprint.sources.iter().enumerate() {
        if blueprint.engine.channel_index(&source.channel).is_none() {
            return Err(ContractError::config_validation(
                format!("sources[{idx}].channel"),
                format!("channel '{}' not found in engine.channels", source.channel),
            ));
        }
        if !fed.insert(source.channel.as_str()) {
            return Err(ContractError::config_validation(
                format!("sources[{idx}].channel"),
                format!("duplicate source for channel '{}'", source.channel),
            ));
        }
    }
    Ok(())
}

/// Source timing and shape
fn validate_source_rates(blueprint: &PipelineBlueprint) -> Result<(), ContractError> {
    for (idx, source) in blueprint.sources.iter().enumerate() {
        if !source.prf_hz.is_finite() || source.prf_hz <= 0.0 {
            return Err(ContractError::config_validation(
                format!("sources[{idx}].prf_hz"),
                format!("prf_hz must be > 0, got {}", source.prf_hz),
            ));
        }
        if source.samples == 0 {
            return Err(ContractError::config_validation(
                format!("sources[{idx}].samples"),
                "samples must be > 0",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{AlgorithmConfig, ConfigVersion, SourceConfig, SyncEngineConfig};

    fn source(channel: &str) -> SourceConfig {
        SourceConfig {
            channel: channel.into(),
            prf_hz: 1000.0,
            start_sequence: 0,
            pulses_per_cpi: 4,
            waveform_codes: vec![1, 2],
            drop_probability: 0.0,
            samples: 64,
        }
    }

    fn minimal_blueprint() -> PipelineBlueprint {
        PipelineBlueprint {
            version: ConfigVersion::V1,
            algorithm: AlgorithmConfig {
                name: "summer".into(),
            },
            engine: SyncEngineConfig::uniform(2, 10, true).with_cpi(4),
            sources: vec![source("input1"), source("input2")],
        }
    }

    #[test]
    fn test_valid_config() {
        let bp = minimal_blueprint();
        assert!(validate(&bp).is_ok());
    }

    #[test]
    fn test_zero_buffer_size() {
        let mut bp = minimal_blueprint();
        bp.engine.max_buffer_size = 0;
        let err = validate(&bp).unwrap_err();
        assert!(matches!(err, ContractError::ConfigValidation { .. }));
        assert!(err.to_string().contains("max_buffer_size"));
    }

    #[test]
    fn test_zero_cpi_span() {
        let mut bp = minimal_blueprint();
        bp.engine = bp.engine.with_cpi(0);
        assert!(validate(&bp).is_err());
    }

    #[test]
    fn test_zero_channel_buffer_size() {
        let mut bp = minimal_blueprint();
        bp.engine.channels[1].max_buffer_size = Some(0);
        assert!(validate(&bp).is_err());
    }

    #[test]
    fn test_duplicate_channel_name() {
        let mut bp = minimal_blueprint();
        bp.engine.channels[1].name = "input1".into();
        bp.sources.truncate(1);
        let err = validate(&bp).unwrap_err();
        assert!(err.to_string().contains("duplicate channel"));
    }

    #[test]
    fn test_source_unknown_channel() {
        let mut bp = minimal_blueprint();
        bp.sources[1].channel = "input9".into();
        let err = validate(&bp).unwrap_err();
        assert!(err.to_string().contains("input9"));
    }

    #[test]
    fn test_duplicate_source() {
        let mut bp = minimal_blueprint();
        bp.sources[1].channel = "input1".into();
        let err = validate(&bp).unwrap_err();
        assert!(err.to_string().contains("duplicate source"));
    }

    #[test]
    fn test_invalid_prf() {
        let mut bp = minimal_blueprint();
        bp.sources[0].prf_hz = 0.0;
        let err = validate(&bp).unwrap_err();
        assert!(err.to_string().contains("prf_hz"));
    }

    #[test]
    fn test_no_channels() {
        let mut bp = minimal_blueprint();
        bp.engine.channels.clear();
        bp.sources.clear();
        assert!(validate(&bp).is_err());
    }
}
