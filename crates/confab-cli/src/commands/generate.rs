//! One-shot generation command implementation

use anyhow::Result;
use async_trait::async_trait;
use clap::Args;
use console::style;
use serde_json::json;
use std::time::Instant;
use tracing::debug;

use confab_core::stream::StdoutSink;

use crate::commands::{Command, SessionArgs};
use crate::config::Config;
use crate::utils::{format_duration, print_output, BufferSink};

#[derive(Args, Debug)]
pub struct GenerateCommand {
    /// Prompt text to generate from
    pub prompt: String,

    #[command(flatten)]
    pub session: SessionArgs,

    /// Decode steps between terminal updates
    #[arg(long)]
    pub poll_interval: Option<usize>,

    /// Show runtime statistics after generation
    #[arg(long)]
    pub stats: bool,
}

#[async_trait]
impl Command for GenerateCommand {
    async fn execute(&self, config: &Config, json_output: bool) -> Result<()> {
        debug!("Executing generate command: {:?}", self);

        if self.prompt.trim().is_empty() {
            anyhow::bail!(
                "Prompt cannot be empty or whitespace only\n\
                Suggestion: Provide meaningful text for the model to process"
            );
        }

        let mut session = self.session.open_session(config).await?;
        session.process_system_prompts().await?;
        let poll_interval = self.poll_interval.unwrap_or(config.stream.poll_interval);

        let start = Instant::now();
        if json_output {
            let mut sink = BufferSink::new();
            session
                .generate(&self.prompt, &mut sink, poll_interval)
                .await?;
            let elapsed = start.elapsed();

            let output = json!({
                "model_path": session.model_path().to_string_lossy(),
                "device": session.device().to_string(),
                "prompt": self.prompt,
                "response": sink.text(),
                "generation_time_ms": elapsed.as_millis() as u64,
                "stats": session.runtime_stats_text().await?,
            });
            print_output(&output, true)?;
        } else {
            let mut sink = StdoutSink::new();
            session
                .generate(&self.prompt, &mut sink, poll_interval)
                .await?;
            let elapsed = start.elapsed();

            if self.stats {
                println!();
                println!(
                    "{} {}",
                    style("Stats:").bold(),
                    session.runtime_stats_text().await?
                );
                println!("{} {}", style("Wall time:").bold(), format_duration(elapsed));
            }
        }

        Ok(())
    }
}
