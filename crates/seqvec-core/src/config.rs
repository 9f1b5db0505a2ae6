//! TOML config loading for the seqvec CLI.
//!
//! Deserializes `configs/pipeline.toml`, which has `[parser]`, `[embedder]`,
//! and `[pipeline]` sections, then merges CLI overrides on top.

use std::path::Path;

use embedding::PipelineConfig;
use fasta::ParserConfig;
use serde::Deserialize;

/// Top-level structure matching `configs/pipeline.toml`. Every section is optional.
#[derive(Debug, Default, Deserialize)]
pub struct PipelineToml {
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub embedder: EmbedderConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Connection settings for the embedding server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EmbedderConfig {
    /// Base URL, e.g. `http://localhost:8000`. `--server-url` overrides it.
    #[serde(default)]
    pub server_url: Option<String>,
    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_connect_timeout_secs() -> u64 {
    5
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// Values given on the command line; `None` leaves the TOML value alone.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub server_url: Option<String>,
    pub workers: Option<usize>,
    pub batch_size: Option<usize>,
}

/// Load and deserialize a `PipelineToml` from a TOML file.
pub fn load_pipeline_toml(path: &Path) -> anyhow::Result<PipelineToml> {
    let contents = std::fs::read_to_string(path)?;
    let config: PipelineToml = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("Invalid config {}: {e}", path.display()))?;
    tracing::info!(path = %path.display(), "Loaded pipeline config");
    Ok(config)
}

/// Build the effective configuration.
///
/// Priority chain: serde defaults < TOML values < CLI flags. `--workers`
/// applies to both the parser and the embedding pool.
pub fn build_pipeline_config(
    path: Option<&Path>,
    overrides: &CliOverrides,
) -> anyhow::Result<PipelineToml> {
    let mut config = match path {
        Some(path) => load_pipeline_toml(path)?,
        None => PipelineToml::default(),
    };

    if let Some(url) = &overrides.server_url {
        config.embedder.server_url = Some(url.clone());
    }
    if let Some(n) = overrides.workers {
        config.parser.num_workers = Some(n);
        config.pipeline.workers = Some(n);
    }
    if let Some(n) = overrides.batch_size {
        config.pipeline.batch_size = n;
    }

    config.pipeline.validate();
    Ok(config)
}
