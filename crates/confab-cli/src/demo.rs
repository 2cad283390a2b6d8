//! Built-in echo backend
//!
//! Stands in for a compiled model library so every command can run end
//! to end without one. The backend honors the full contract: it reads
//! the model's config document during reload, applies JSON overrides,
//! reports role names from the conversation config, and tracks runtime
//! counters. Its output is the prompt echoed back one word per decode
//! step.

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::time::sleep;
use tracing::debug;

use confab_core::backend::{BackendFactory, ChatBackend, Embedding, PlaceInPrompt};
use confab_core::device::{Device, DeviceType};
use confab_core::resolve::CHAT_CONFIG_FILE;
use confab_core::{CoreError, Result};

/// Pause per decoded word, so streaming is visible in a terminal
const DECODE_PAUSE: Duration = Duration::from_millis(25);

/// Word-by-word echo implementation of [`ChatBackend`]
pub struct EchoBackend {
    device: Device,
    config: Map<String, Value>,
    pending: Vec<String>,
    position: usize,
    message: String,
    prefill_tokens: u64,
    prefill_time: Duration,
    decode_tokens: u64,
    decode_time: Duration,
}

impl EchoBackend {
    pub fn new(device: Device) -> Self {
        Self {
            device,
            config: Map::new(),
            pending: Vec::new(),
            position: 0,
            message: String::new(),
            prefill_tokens: 0,
            prefill_time: Duration::ZERO,
            decode_tokens: 0,
            decode_time: Duration::ZERO,
        }
    }

    fn begin_turn(&mut self, words: Vec<String>) {
        self.pending = words;
        self.position = 0;
        self.message.clear();
    }

    async fn step(&mut self) {
        if self.position >= self.pending.len() {
            return;
        }
        let start = Instant::now();
        sleep(DECODE_PAUSE).await;
        if !self.message.is_empty() {
            self.message.push(' ');
        }
        self.message.push_str(&self.pending[self.position]);
        self.position += 1;
        self.decode_tokens += 1;
        self.decode_time += start.elapsed();
    }

    fn role(&self, index: usize, fallback: &str) -> String {
        self.config
            .get("conv_config")
            .and_then(|c| c.get("roles"))
            .and_then(|r| r.get(index))
            .and_then(|v| v.as_str())
            .unwrap_or(fallback)
            .to_string()
    }

    fn rate(tokens: u64, time: Duration) -> f64 {
        if time.is_zero() {
            0.0
        } else {
            tokens as f64 / time.as_secs_f64()
        }
    }
}

fn words_of(input: &str) -> Vec<String> {
    input.split_whitespace().map(String::from).collect()
}

#[async_trait]
impl ChatBackend for EchoBackend {
    async fn reload(
        &mut self,
        library: &Path,
        model_path: &Path,
        override_json: &str,
    ) -> Result<()> {
        let content = std::fs::read_to_string(model_path.join(CHAT_CONFIG_FILE))?;
        let mut config: Map<String, Value> = serde_json::from_str(&content)?;

        if !override_json.is_empty() {
            let patch: Map<String, Value> = serde_json::from_str(override_json)?;
            config.extend(patch);
        }

        self.config = config;
        self.begin_turn(Vec::new());
        debug!(
            "Echo backend bound to {} via {} on {}",
            model_path.display(),
            library.display(),
            self.device
        );
        Ok(())
    }

    async fn unload(&mut self) -> Result<()> {
        self.config.clear();
        self.begin_turn(Vec::new());
        Ok(())
    }

    async fn prefill(
        &mut self,
        input: &str,
        decode_next_token: bool,
        _place: PlaceInPrompt,
    ) -> Result<()> {
        let start = Instant::now();
        let words = words_of(input);
        self.prefill_tokens += words.len() as u64;
        sleep(Duration::from_millis(2 * words.len() as u64)).await;
        self.begin_turn(words);
        self.prefill_time += start.elapsed();

        if decode_next_token {
            self.step().await;
        }
        Ok(())
    }

    async fn prefill_with_embedding(
        &mut self,
        embedding: Embedding,
        decode_next_token: bool,
    ) -> Result<()> {
        let words = embedding
            .downcast::<Vec<String>>()
            .ok_or_else(|| CoreError::backend("Embedding was not produced by the echo backend"))?;
        self.prefill_tokens += words.len() as u64;
        self.begin_turn(words);

        if decode_next_token {
            self.step().await;
        }
        Ok(())
    }

    async fn decode(&mut self) -> Result<()> {
        self.step().await;
        Ok(())
    }

    async fn reset_chat(&mut self) -> Result<()> {
        self.begin_turn(Vec::new());
        Ok(())
    }

    async fn load_json_override(&mut self, json: &str, partial_update: bool) -> Result<()> {
        if json.is_empty() {
            if !partial_update {
                self.config.clear();
            }
            return Ok(());
        }

        let patch: Map<String, Value> = serde_json::from_str(json)?;
        if partial_update {
            self.config.extend(patch);
        } else {
            self.config = patch;
        }
        Ok(())
    }

    async fn stopped(&self) -> Result<bool> {
        Ok(self.position >= self.pending.len())
    }

    async fn get_message(&self) -> Result<String> {
        Ok(self.message.clone())
    }

    async fn get_config_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&Value::Object(
            self.config.clone(),
        ))?)
    }

    async fn embed(&mut self, input: &str, _place: PlaceInPrompt) -> Result<Embedding> {
        Ok(Embedding::new(words_of(input)))
    }

    async fn get_role0(&self) -> Result<String> {
        Ok(self.role(0, "USER"))
    }

    async fn get_role1(&self) -> Result<String> {
        Ok(self.role(1, "ASSISTANT"))
    }

    async fn runtime_stats_text(&self) -> Result<String> {
        Ok(format!(
            "prefill: {:.1} tok/s, decode: {:.1} tok/s",
            Self::rate(self.prefill_tokens, self.prefill_time),
            Self::rate(self.decode_tokens, self.decode_time),
        ))
    }

    async fn reset_runtime_stats(&mut self) -> Result<()> {
        self.prefill_tokens = 0;
        self.prefill_time = Duration::ZERO;
        self.decode_tokens = 0;
        self.decode_time = Duration::ZERO;
        Ok(())
    }

    async fn process_system_prompts(&mut self) -> Result<()> {
        let system_words = self
            .config
            .get("conv_config")
            .and_then(|c| c.get("system"))
            .and_then(|v| v.as_str())
            .map(|s| words_of(s).len() as u64)
            .unwrap_or(0);
        self.prefill_tokens += system_words;
        Ok(())
    }

    async fn evaluate(&mut self, token_len: usize, generate_len: usize) -> Result<()> {
        let start = Instant::now();
        sleep(Duration::from_millis((token_len / 32) as u64)).await;
        self.prefill_tokens += token_len as u64;
        self.prefill_time += start.elapsed();

        let start = Instant::now();
        sleep(Duration::from_millis((generate_len / 16) as u64)).await;
        self.decode_tokens += generate_len as u64;
        self.decode_time += start.elapsed();

        // Measurement only; the conversation state is deliberately not
        // meaningful afterwards.
        self.begin_turn(Vec::new());
        Ok(())
    }
}

/// Factory for [`EchoBackend`]. The echo implementation runs anywhere,
/// so only the CPU reports as available and auto-detection settles
/// there.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoBackendFactory;

impl EchoBackendFactory {
    pub fn new() -> Self {
        Self
    }
}

impl BackendFactory for EchoBackendFactory {
    fn device_available(&self, device_type: DeviceType) -> bool {
        device_type == DeviceType::Cpu
    }

    fn create(&self, device: Device) -> Result<Box<dyn ChatBackend>> {
        Ok(Box::new(EchoBackend::new(device)))
    }
}
