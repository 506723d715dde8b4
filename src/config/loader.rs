use super::EngineConfig;
use crate::error::{EngineError, EngineResult, ErrorCode};
use std::path::Path;
use tokio::fs;
use tracing::debug;

/// Configuration file formats, chosen by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Toml,
    Yaml,
}

impl Format {
    fn from_path(path: &Path) -> EngineResult<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("yaml") | Some("yml") => Ok(Self::Yaml),
            other => Err(EngineError::ConfigLoad {
                code: ErrorCode::CONFIG_GENERIC,
                path: path.to_path_buf(),
                message: format!(
                    "unsupported extension {:?}, expected .toml, .yaml or .yml",
                    other.unwrap_or("")
                ),
                source: None,
            }),
        }
    }
}

/// Read, parse and validate an engine configuration file
pub async fn load_engine_config(path: &Path) -> EngineResult<EngineConfig> {
    let format = Format::from_path(path)?;
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| EngineError::ConfigLoad {
            code: ErrorCode::CONFIG_NOT_FOUND,
            path: path.to_path_buf(),
            message: "cannot read file".to_string(),
            source: Some(Box::new(e)),
        })?;

    let config = parse_engine_config(&content, format).map_err(|(code, source)| {
        EngineError::ConfigLoad {
            code,
            path: path.to_path_buf(),
            message: source.to_string(),
            source: Some(source),
        }
    })?;
    config.validate()?;

    debug!("Loaded engine configuration from {}", path.display());
    Ok(config)
}

type ParseError = (u16, Box<dyn std::error::Error + Send + Sync>);

fn parse_engine_config(content: &str, format: Format) -> Result<EngineConfig, ParseError> {
    match format {
        Format::Toml => toml::from_str(content).map_err(|e| -> ParseError {
            (ErrorCode::CONFIG_INVALID_TOML, Box::new(e))
        }),
        Format::Yaml => serde_yaml::from_str(content).map_err(|e| -> ParseError {
            (ErrorCode::CONFIG_INVALID_YAML, Box::new(e))
        }),
    }
}
