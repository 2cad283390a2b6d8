//! Synthetic benchmark command implementation
//!
//! Drives the backend's evaluate entry point: a placeholder prefill of
//! `token_len` tokens followed by `gen_len` decode steps, repeated over
//! warmup and measured iterations.

use anyhow::Result;
use async_trait::async_trait;
use clap::Args;
use console::style;
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::commands::{Command, SessionArgs};
use crate::config::Config;
use crate::utils::{create_progress_bar, format_duration, print_output, print_success};

#[derive(Args, Debug)]
pub struct BenchCommand {
    #[command(flatten)]
    pub session: SessionArgs,

    /// Synthetic prompt length in tokens
    #[arg(long)]
    pub token_len: Option<usize>,

    /// Decode steps per iteration
    #[arg(long)]
    pub gen_len: Option<usize>,

    /// Number of measured iterations
    #[arg(long)]
    pub iterations: Option<u32>,

    /// Warmup iterations
    #[arg(long)]
    pub warmup: Option<u32>,
}

#[derive(Debug)]
struct BenchResult {
    iterations: u32,
    times: Vec<Duration>,
    mean_time: Duration,
    min_time: Duration,
    max_time: Duration,
}

impl BenchResult {
    fn new(times: Vec<Duration>) -> Self {
        let iterations = times.len() as u32;
        let mean_time = if iterations == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(
                (times.iter().map(|d| d.as_nanos()).sum::<u128>() / iterations as u128) as u64,
            )
        };
        let min_time = times.iter().min().copied().unwrap_or_default();
        let max_time = times.iter().max().copied().unwrap_or_default();

        Self {
            iterations,
            times,
            mean_time,
            min_time,
            max_time,
        }
    }
}

#[async_trait]
impl Command for BenchCommand {
    async fn execute(&self, config: &Config, json_output: bool) -> Result<()> {
        debug!("Executing bench command: {:?}", self);

        let token_len = self.token_len.unwrap_or(config.bench.token_len);
        let gen_len = self.gen_len.unwrap_or(config.bench.gen_len);
        let iterations = self.iterations.unwrap_or(config.bench.iterations);
        let warmup = self.warmup.unwrap_or(config.bench.warmup_iterations);

        let mut session = self.session.open_session(config).await?;
        info!(
            "Benchmarking {} (prefill {} tokens, decode {} steps)",
            session.model_path().display(),
            token_len,
            gen_len
        );

        let pb = create_progress_bar((warmup + iterations) as u64, "Evaluating");

        for _ in 0..warmup {
            session.evaluate(token_len, gen_len).await?;
            pb.inc(1);
        }

        session.reset_runtime_stats().await?;
        let mut times = Vec::with_capacity(iterations as usize);
        for _ in 0..iterations {
            let start = Instant::now();
            session.evaluate(token_len, gen_len).await?;
            times.push(start.elapsed());
            pb.inc(1);
        }
        pb.finish_and_clear();

        let result = BenchResult::new(times);
        let stats = session.runtime_stats_text().await?;

        if json_output {
            let output = json!({
                "token_len": token_len,
                "gen_len": gen_len,
                "iterations": result.iterations,
                "mean_ms": result.mean_time.as_secs_f64() * 1000.0,
                "min_ms": result.min_time.as_secs_f64() * 1000.0,
                "max_ms": result.max_time.as_secs_f64() * 1000.0,
                "iteration_ms": result
                    .times
                    .iter()
                    .map(|t| t.as_secs_f64() * 1000.0)
                    .collect::<Vec<_>>(),
                "stats": stats,
            });
            print_output(&output, true)?;
        } else {
            print_success(&format!(
                "Completed {} iterations in {}",
                result.iterations,
                format_duration(result.times.iter().sum())
            ));
            println!("{}", style("Benchmark Results").bold().cyan());
            println!(
                "Workload: prefill {} tokens, decode {} steps",
                token_len, gen_len
            );
            println!("Iterations: {}", result.iterations);
            println!("Mean: {}", format_duration(result.mean_time));
            println!("Min:  {}", format_duration(result.min_time));
            println!("Max:  {}", format_duration(result.max_time));
            println!("Backend: {}", stats);
        }

        Ok(())
    }
}
