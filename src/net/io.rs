//! I/O 支持：快照与报告的 JSON、RON 序列化。
use std::fs;
use std::path::Path;

use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("ron error: {0}")]
    Ron(#[from] ron::Error),
    #[error("ron parse error: {0}")]
    RonParse(#[from] ron::error::SpannedError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Ron,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "ron" => Ok(OutputFormat::Ron),
            other => Err(format!("unknown output format '{other}'")),
        }
    }
}

pub fn to_json_string<T>(value: &T) -> Result<String, IoError>
where
    T: Serialize,
{
    Ok(serde_json::to_string_pretty(value)?)
}

pub fn from_json_str<T>(s: &str) -> Result<T, IoError>
where
    T: DeserializeOwned,
{
    Ok(serde_json::from_str(s)?)
}

pub fn to_ron_string<T>(value: &T) -> Result<String, IoError>
where
    T: Serialize,
{
    let pretty = PrettyConfig::default().new_line("\n".to_string());
    Ok(ron::ser::to_string_pretty(value, pretty)?)
}

pub fn from_ron_str<T>(s: &str) -> Result<T, IoError>
where
    T: DeserializeOwned,
{
    Ok(ron::from_str(s)?)
}

pub fn render<T: Serialize>(value: &T, format: OutputFormat) -> Result<String, IoError> {
    match format {
        OutputFormat::Json => to_json_string(value),
        OutputFormat::Ron => to_ron_string(value),
    }
}

pub fn parse<T: DeserializeOwned>(s: &str, format: OutputFormat) -> Result<T, IoError> {
    match format {
        OutputFormat::Json => from_json_str(s),
        OutputFormat::Ron => from_ron_str(s),
    }
}

/// Renders `value` and writes it, creating parent directories as needed.
pub fn write<P: AsRef<Path>, T: Serialize>(
    path: P,
    value: &T,
    format: OutputFormat,
) -> Result<(), IoError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, render(value, format)?)?;
    Ok(())
}

pub fn read<P: AsRef<Path>, T: DeserializeOwned>(
    path: P,
    format: OutputFormat,
) -> Result<T, IoError> {
    let content = fs::read_to_string(path)?;
    parse(&content, format)
}
