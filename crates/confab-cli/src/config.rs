//! Configuration management for Confab CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use confab_core::resolve::CHAT_CONFIG_FILE;

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Default model identifier
    pub default_model: Option<String>,

    /// Model search directories
    pub model_dirs: Vec<PathBuf>,

    /// Session defaults applied when the matching flag is absent
    pub session: SessionDefaults,

    /// Streaming configuration
    pub stream: StreamDefaults,

    /// Benchmark configuration
    pub bench: BenchDefaults,
}

/// Session defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDefaults {
    /// Device name passed to the session controller
    pub device: String,

    /// Device ordinal for multi-accelerator hosts
    pub device_id: usize,

    /// Sampling temperature override
    pub temperature: Option<f32>,

    /// Nucleus sampling threshold override
    pub top_p: Option<f32>,

    /// Repetition penalty override
    pub repetition_penalty: Option<f32>,

    /// Maximum tokens per response
    pub max_gen_len: Option<usize>,

    /// Conversation template override
    pub conv_template: Option<String>,
}

/// Streaming configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamDefaults {
    /// Decode steps between terminal updates
    pub poll_interval: usize,
}

/// Benchmark configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchDefaults {
    /// Synthetic prompt length in tokens
    pub token_len: usize,

    /// Decode steps per iteration
    pub gen_len: usize,

    /// Number of measured iterations
    pub iterations: u32,

    /// Warmup iterations
    pub warmup_iterations: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_model: None,
            model_dirs: vec![
                dirs::home_dir().unwrap_or_default().join(".confab/models"),
                PathBuf::from("./models"),
            ],
            session: SessionDefaults::default(),
            stream: StreamDefaults::default(),
            bench: BenchDefaults::default(),
        }
    }
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            device: "auto".to_string(),
            device_id: 0,
            temperature: None,
            top_p: None,
            repetition_penalty: None,
            max_gen_len: None,
            conv_template: None,
        }
    }
}

impl Default for StreamDefaults {
    fn default() -> Self {
        Self { poll_interval: 1 }
    }
}

impl Default for BenchDefaults {
    fn default() -> Self {
        Self {
            token_len: 64,
            gen_len: 128,
            iterations: 3,
            warmup_iterations: 1,
        }
    }
}

impl Config {
    /// Load configuration from file or create default
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config_path = match config_path {
            Some(path) => path.to_path_buf(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

            Ok(config)
        } else {
            // Create default config
            let config = Config::default();
            config.save(&config_path)?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(self)
            .context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Get default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".config"))
            .join("confab")
            .join("config.toml")
    }

    /// Resolve a model identifier against the configured directories.
    ///
    /// Identifiers that name an existing path, before or after shell
    /// expansion, pass through unchanged. Otherwise each configured
    /// directory is checked for a model folder carrying a config
    /// document. Unresolved identifiers also pass through, so the
    /// session controller's own search over the local dist layouts
    /// still applies.
    pub fn find_model(&self, model_id: &str) -> Result<String> {
        if Path::new(model_id).exists() {
            return Ok(model_id.to_string());
        }

        // Expand shell variables like ~
        let expanded = shellexpand::full(model_id)
            .context("Failed to expand shell variables in model identifier")?;
        if expanded.as_ref() != model_id && Path::new(expanded.as_ref()).exists() {
            return Ok(expanded.into_owned());
        }

        for dir in &self.model_dirs {
            let candidate = dir.join(model_id);
            if candidate.join(CHAT_CONFIG_FILE).is_file() {
                return Ok(candidate.to_string_lossy().into_owned());
            }
        }

        Ok(model_id.to_string())
    }
}
