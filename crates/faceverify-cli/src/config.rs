use anyhow::{Context, Result};
use faceverify_core::PipelineConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const DEFAULT_ENGINE_COMMAND: &str = "faceverify-engine";
const DEFAULT_VERIFY_TIMEOUT_SECS: u64 = 60;

/// CLI configuration: optional TOML file, then `FACEVERIFY_*` environment overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub engine: EngineConfig,
    /// How long to wait for one verification before giving up on it.
    pub verify_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine command line, split on whitespace.
    pub command: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pipeline: PipelineConfig::default(),
            engine: EngineConfig::default(),
            verify_timeout_secs: DEFAULT_VERIFY_TIMEOUT_SECS,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_ENGINE_COMMAND.to_string(),
        }
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                Self::from_toml(&text)
                    .with_context(|| format!("invalid config {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `FACEVERIFY_*` overrides. Unparseable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let pipeline = &mut self.pipeline;
        if let Some(v) = parse_var(&lookup, "FACEVERIFY_MAX_SIZE_MB") {
            pipeline.max_size_mb = v;
        }
        if let Some(v) = parse_var(&lookup, "FACEVERIFY_MAX_DIMENSION") {
            pipeline.max_dimension = v;
        }
        if let Some(v) = parse_var(&lookup, "FACEVERIFY_JPEG_QUALITY") {
            pipeline.jpeg_quality = v;
        }
        if let Some(v) = lookup("FACEVERIFY_TEMP_DIR").filter(|v| !v.is_empty()) {
            pipeline.temp_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("FACEVERIFY_ENGINE").filter(|v| !v.trim().is_empty()) {
            self.engine.command = v;
        }
        if let Some(v) = parse_var(&lookup, "FACEVERIFY_VERIFY_TIMEOUT_SECS") {
            self.verify_timeout_secs = v;
        }
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable override");
            None
        }
    }
}
