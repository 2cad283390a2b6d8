//! Interactive chat command implementation
//!
//! A line-oriented REPL over one chat session. Model output streams to
//! the terminal through the reconciling stdout sink, so retroactive
//! corrections like a stripped stop string render in place.

use anyhow::Result;
use async_trait::async_trait;
use clap::Args;
use console::style;
use std::io::{self, Write};
use tracing::debug;

use confab_core::stream::StdoutSink;

use crate::commands::{Command, SessionArgs};
use crate::config::Config;

#[derive(Args, Debug)]
pub struct ChatCommand {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Decode steps between terminal updates
    #[arg(long)]
    pub poll_interval: Option<usize>,
}

#[async_trait]
impl Command for ChatCommand {
    async fn execute(&self, config: &Config, _json_output: bool) -> Result<()> {
        debug!("Executing chat command: {:?}", self);

        let mut session = self.session.open_session(config).await?;
        session.process_system_prompts().await?;

        let role0 = session.role0().await?;
        let role1 = session.role1().await?;
        let poll_interval = self.poll_interval.unwrap_or(config.stream.poll_interval);

        println!("{}", style("Confab Interactive Chat").bold().cyan());
        println!(
            "Model: {} on {}",
            session.model_path().display(),
            session.device()
        );
        println!(
            "{}",
            style("Running on the built-in echo backend; responses repeat your prompt.").dim()
        );
        println!("Type /help for commands, /exit to quit.");
        println!();

        let mut input = String::new();
        loop {
            print!("{} ", style(format!("{}:", role0)).bold().green());
            io::stdout().flush()?;

            input.clear();
            if io::stdin().read_line(&mut input)? == 0 {
                println!();
                break;
            }
            let line = input.trim();

            if line.is_empty() {
                continue;
            }

            match line {
                "/exit" | "/quit" => break,
                "/help" => self.print_help(),
                "/reset" => {
                    session.reset(None).await?;
                    println!("{}", style("Conversation reset").dim());
                }
                "/stats" => println!("{}", session.runtime_stats_text().await?),
                "/config" => println!("{}", session.config_json().await?),
                _ if line.starts_with('/') => {
                    println!("Unknown command: {}. Type /help for the list.", line);
                }
                _ => {
                    print!("{} ", style(format!("{}:", role1)).bold().blue());
                    io::stdout().flush()?;
                    let mut sink = StdoutSink::new();
                    session.generate(line, &mut sink, poll_interval).await?;
                }
            }
        }

        println!("Goodbye!");
        Ok(())
    }
}

impl ChatCommand {
    fn print_help(&self) {
        println!("Commands:");
        println!("  /reset   Clear the conversation history");
        println!("  /stats   Show prefill/decode throughput");
        println!("  /config  Show the effective backend configuration");
        println!("  /help    Show this message");
        println!("  /exit    Leave the chat");
    }
}
