//! Session info command implementation
//!
//! Resolves a model exactly as the chat command would and reports what
//! the session ended up with: paths, device, and the effective
//! generation settings.

use anyhow::Result;
use async_trait::async_trait;
use clap::Args;
use console::style;
use serde_json::json;
use tabled::{settings::Style, Table, Tabled};
use tracing::debug;

use confab_core::config::SessionConfig;

use crate::commands::{Command, SessionArgs};
use crate::config::Config;
use crate::utils::print_output;

#[derive(Args, Debug)]
pub struct InfoCommand {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Show the raw backend configuration document
    #[arg(long)]
    pub raw: bool,
}

#[derive(Tabled)]
struct SettingRow {
    setting: String,
    value: String,
}

#[async_trait]
impl Command for InfoCommand {
    async fn execute(&self, config: &Config, json_output: bool) -> Result<()> {
        debug!("Executing info command: {:?}", self);

        let session = self.session.open_session(config).await?;
        let backend_config = session.config_json().await?;

        if json_output {
            let output = json!({
                "model_path": session.model_path().to_string_lossy(),
                "config_path": session.config_path().to_string_lossy(),
                "library_path": session.library_path().to_string_lossy(),
                "device": session.device().to_string(),
                "config": serde_json::from_str::<serde_json::Value>(&backend_config)?,
            });
            print_output(&output, true)?;
            return Ok(());
        }

        println!("{}", style("Session").bold().cyan());
        println!("Model: {}", session.model_path().display());
        println!("Config: {}", session.config_path().display());
        println!("Library: {}", session.library_path().display());
        println!("Device: {}", session.device());
        println!("Backend: built-in echo (demonstration)");
        println!();

        println!("{}", style("Generation Settings").bold().cyan());
        let table = Table::new(self.setting_rows(session.config()))
            .with(Style::modern())
            .to_string();
        println!("{}", table);

        if self.raw {
            println!();
            println!("{}", style("Backend Configuration").bold().cyan());
            println!("{}", backend_config);
        }

        Ok(())
    }
}

impl InfoCommand {
    fn setting_rows(&self, config: &SessionConfig) -> Vec<SettingRow> {
        fn row<T: std::fmt::Display>(setting: &str, value: &Option<T>) -> SettingRow {
            SettingRow {
                setting: setting.to_string(),
                value: value
                    .as_ref()
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "engine default".to_string()),
            }
        }

        vec![
            row("conv_template", &config.conv_template),
            row("temperature", &config.temperature),
            row("repetition_penalty", &config.repetition_penalty),
            row("top_p", &config.top_p),
            row("mean_gen_len", &config.mean_gen_len),
            row("max_gen_len", &config.max_gen_len),
            row("shift_fill_factor", &config.shift_fill_factor),
            row("model_lib", &config.model_lib),
            row("local_id", &config.local_id),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setting_rows_label_unset_fields() {
        let cmd = InfoCommand {
            session: SessionArgs::default(),
            raw: false,
        };
        let config = SessionConfig {
            temperature: Some(0.5),
            ..SessionConfig::default()
        };

        let rows = cmd.setting_rows(&config);
        let temperature = rows.iter().find(|r| r.setting == "temperature").unwrap();
        assert_eq!(temperature.value, "0.5");

        let top_p = rows.iter().find(|r| r.setting == "top_p").unwrap();
        assert_eq!(top_p.value, "engine default");
    }
}
