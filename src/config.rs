//! TOML configuration.
//!
//! Every process-wide default (index location, collection name, model
//! names, batch sizes, output paths) lives in [`Config`] and is passed to
//! the components that need it. All sections and fields are optional; a
//! missing file means built-in defaults.
//!
//! ```toml
//! [index]
//! dir = "./data/index"
//! collection = "neurashield_code"
//!
//! [chunking]
//! max_tokens = 500
//! oversize = "split"
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! batch_size = 100
//! batch_delay_ms = 100
//!
//! [llm]
//! provider = "openai"
//! model = "gpt-4o"
//!
//! [retrieval]
//! top_k = 5
//! ```

use anyhow::{bail, Context, Result};
use neurashield_core::chunk::{ChunkOptions, OversizePolicy};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "shield.toml";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub index: IndexConfig,
    pub extract: ExtractConfig,
    pub preprocess: PreprocessConfig,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IndexConfig {
    pub dir: PathBuf,
    pub collection: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./data/index"),
            collection: "neurashield_code".to_string(),
        }
    }
}

impl IndexConfig {
    pub fn db_path(&self) -> PathBuf {
        self.dir.join("index.sqlite")
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExtractConfig {
    pub include_globs: Vec<String>,
    /// Directory names skipped at any depth.
    pub exclude_dirs: Vec<String>,
    /// Parent directory for clones; the system temp dir when unset.
    pub clone_dir: Option<PathBuf>,
    pub branch: Option<String>,
    pub shallow: bool,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            include_globs: vec!["**/*.py".to_string()],
            exclude_dirs: [
                "venv",
                "env",
                ".venv",
                "node_modules",
                ".git",
                "__pycache__",
                ".pytest_cache",
                "tests",
                "test",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            clone_dir: None,
            branch: None,
            shallow: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PreprocessConfig {
    pub remove_comments: bool,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            remove_comments: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
    pub oversize: OversizePolicy,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: 500,
            oversize: OversizePolicy::Split,
        }
    }
}

impl ChunkingConfig {
    pub fn options(&self) -> ChunkOptions {
        ChunkOptions {
            max_tokens: self.max_tokens,
            oversize: self.oversize,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    pub dims: Option<usize>,
    pub batch_size: usize,
    pub batch_delay_ms: u64,
    pub max_retries: u32,
    pub timeout_secs: u64,
    pub url: Option<String>,
    pub api_key_env: String,
    pub price_per_million: Option<f64>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "text-embedding-3-small".to_string(),
            dims: None,
            batch_size: 100,
            batch_delay_ms: 100,
            max_retries: 0,
            timeout_secs: 30,
            url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            price_per_million: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    /// Configured dimensionality, or the model's known size.
    pub fn resolved_dims(&self) -> usize {
        if let Some(dims) = self.dims {
            return dims;
        }
        match self.provider.as_str() {
            "ollama" => 768,
            _ if self.model.contains("small") || self.model.contains("ada") => 1536,
            _ => 3072,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub url: Option<String>,
    pub api_key_env: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            temperature: 0.1,
            timeout_secs: 120,
            url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Drop retrieved patterns below this cosine similarity. Off by default.
    pub min_similarity: Option<f64>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_similarity: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub analysis_results: PathBuf,
    pub analysis_report: PathBuf,
    pub repo_results: PathBuf,
    pub repo_report: PathBuf,
    pub pr_results: PathBuf,
    pub pr_report: PathBuf,
    pub dashboard: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            analysis_results: PathBuf::from("analysis_results.json"),
            analysis_report: PathBuf::from("analysis_report.txt"),
            repo_results: PathBuf::from("repo_analysis_results.json"),
            repo_report: PathBuf::from("repo_analysis_report.txt"),
            pr_results: PathBuf::from("pr_analysis_results.json"),
            pr_report: PathBuf::from("pr_analysis_report.md"),
            dashboard: PathBuf::from("security_dashboard.html"),
        }
    }
}

const PROVIDERS: &[&str] = &["openai", "ollama", "disabled"];

/// Parse and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Resolve the config for a run: an explicit path must exist; otherwise
/// `./shield.toml` is used when present, else defaults.
pub fn resolve_config(explicit: Option<&Path>) -> Result<Config> {
    match explicit {
        Some(path) => load_config(path),
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                load_config(default_path)
            } else {
                Ok(Config::default())
            }
        }
    }
}

pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_tokens == 0 {
        bail!("chunking.max_tokens must be > 0");
    }

    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    if config.embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0");
    }

    if config.retrieval.top_k == 0 {
        bail!("retrieval.top_k must be >= 1");
    }

    if let Some(min) = config.retrieval.min_similarity {
        if !(-1.0..=1.0).contains(&min) {
            bail!("retrieval.min_similarity must be in [-1.0, 1.0]");
        }
    }

    if config.index.collection.trim().is_empty() {
        bail!("index.collection must not be empty");
    }

    for (section, provider) in [
        ("embedding", config.embedding.provider.as_str()),
        ("llm", config.llm.provider.as_str()),
    ] {
        if !PROVIDERS.contains(&provider) {
            bail!(
                "Unknown {} provider: '{}'. Must be openai, ollama, or disabled.",
                section,
                provider
            );
        }
    }

    Ok(())
}
