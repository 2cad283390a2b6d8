//! Command implementations for Confab CLI

pub mod bench;
pub mod chat;
pub mod generate;
pub mod info;

use anyhow::Result;
use async_trait::async_trait;
use clap::Args;
use std::path::PathBuf;

use confab_core::config::{ConversationConfig, SessionConfig};
use confab_core::session::{ChatSession, SessionOptions};

use crate::config::Config;
use crate::demo::EchoBackendFactory;
use crate::utils::create_spinner;

/// Trait for CLI command execution
#[async_trait]
pub trait Command {
    /// Execute the command
    async fn execute(&self, config: &crate::config::Config, json_output: bool) -> Result<()>;
}

/// Model and session flags shared by every subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct SessionArgs {
    /// Model identifier or path to a model directory
    #[arg(short, long)]
    pub model: Option<String>,

    /// Device to run on: auto, cuda, metal, vulkan, rocm, opencl, cpu
    #[arg(long)]
    pub device: Option<String>,

    /// Device ordinal for multi-accelerator hosts
    #[arg(long)]
    pub device_id: Option<usize>,

    /// Explicit backend library path, skipping the search
    #[arg(long)]
    pub lib_path: Option<PathBuf>,

    /// Conversation template override
    #[arg(long)]
    pub conv_template: Option<String>,

    /// System prompt override
    #[arg(long)]
    pub system: Option<String>,

    /// Sampling temperature override
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Nucleus sampling threshold override
    #[arg(long)]
    pub top_p: Option<f32>,

    /// Repetition penalty override
    #[arg(long)]
    pub repetition_penalty: Option<f32>,

    /// Maximum tokens per response
    #[arg(long)]
    pub max_gen_len: Option<usize>,
}

impl SessionArgs {
    /// Resolve the model identifier from arguments or configuration
    pub fn resolve_model(&self, config: &Config) -> Result<String> {
        let model_id = match &self.model {
            Some(id) => id.clone(),
            None => match &config.default_model {
                Some(id) => id.clone(),
                None => anyhow::bail!(
                    "No model specified and no default model configured\n\
                    Suggestion: Use --model <id> or set default_model in the config file"
                ),
            },
        };
        config.find_model(&model_id)
    }

    /// Assemble the sparse config override from flags and CLI defaults
    pub fn overrides(&self, config: &Config) -> Option<SessionConfig> {
        let defaults = &config.session;
        let override_config = SessionConfig {
            conv_template: self
                .conv_template
                .clone()
                .or_else(|| defaults.conv_template.clone()),
            temperature: self.temperature.or(defaults.temperature),
            top_p: self.top_p.or(defaults.top_p),
            repetition_penalty: self.repetition_penalty.or(defaults.repetition_penalty),
            max_gen_len: self.max_gen_len.or(defaults.max_gen_len),
            conv_config: self.system.clone().map(|system| ConversationConfig {
                system: Some(system),
                ..Default::default()
            }),
            ..SessionConfig::default()
        };

        if override_config == SessionConfig::default() {
            None
        } else {
            Some(override_config)
        }
    }

    /// Resolve the model and bring up a session over the echo backend
    pub async fn open_session(&self, config: &Config) -> Result<ChatSession> {
        let model = self.resolve_model(config)?;
        let options = SessionOptions {
            device: self
                .device
                .clone()
                .unwrap_or_else(|| config.session.device.clone()),
            device_id: self.device_id.unwrap_or(config.session.device_id),
            config_override: self.overrides(config),
            library_path: self.lib_path.clone(),
        };

        let spinner = create_spinner("Loading model...");
        let factory = EchoBackendFactory::new();
        let session = ChatSession::new(&model, options, &factory).await;
        spinner.finish_and_clear();
        Ok(session?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_none_when_nothing_set() {
        let args = SessionArgs::default();
        let config = Config::default();
        assert!(args.overrides(&config).is_none());
    }

    #[test]
    fn test_overrides_prefer_flags_over_config_defaults() {
        let args = SessionArgs {
            temperature: Some(0.2),
            ..SessionArgs::default()
        };
        let mut config = Config::default();
        config.session.temperature = Some(0.9);
        config.session.top_p = Some(0.8);

        let overrides = args.overrides(&config).unwrap();
        assert_eq!(overrides.temperature, Some(0.2));
        assert_eq!(overrides.top_p, Some(0.8));
        assert!(overrides.conv_template.is_none());
    }

    #[test]
    fn test_system_flag_lands_in_conversation_override() {
        let args = SessionArgs {
            system: Some("Answer briefly.".to_string()),
            ..SessionArgs::default()
        };
        let overrides = args.overrides(&Config::default()).unwrap();
        let conv = overrides.conv_config.unwrap();
        assert_eq!(conv.system.as_deref(), Some("Answer briefly."));
        assert!(conv.roles.is_none());
    }

    #[test]
    fn test_resolve_model_requires_some_model() {
        let args = SessionArgs::default();
        let config = Config::default();
        assert!(args.resolve_model(&config).is_err());
    }
}
