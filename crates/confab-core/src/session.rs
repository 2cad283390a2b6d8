//! Chat session controller
//!
//! One `ChatSession` owns one conversation: the merged configuration,
//! the resolved model paths, the device binding, and exclusive ownership
//! of the backend handle. Construction resolves everything before the
//! backend sees a single call; generation drives the backend's
//! prefill/decode cycle and streams reconciled output deltas to a sink.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::backend::{BackendFactory, ChatBackend, Embedding, PlaceInPrompt};
use crate::config::{self, SessionConfig};
use crate::device::Device;
use crate::resolve;
use crate::stream::{StreamSink, StreamState};
use crate::{CoreError, Result};

/// Construction options for [`ChatSession`]
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Device name: one of the known device types, or "auto"
    pub device: String,

    /// Device ordinal for multi-accelerator hosts
    pub device_id: usize,

    /// Sparse configuration layered over the model's config document
    pub config_override: Option<SessionConfig>,

    /// Explicit backend library path, skipping the search
    pub library_path: Option<PathBuf>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            device: "auto".to_string(),
            device_id: 0,
            config_override: None,
            library_path: None,
        }
    }
}

/// Serialize an override for the backend; anything to serialize requires
/// a resolved template name in the merged config.
fn override_payload(merged: &SessionConfig, overrides: Option<&SessionConfig>) -> Result<String> {
    if overrides.is_none() {
        return Ok(String::new());
    }
    let conv_template = merged.conv_template.as_deref().ok_or_else(|| {
        CoreError::configuration_field(
            "CONV_TEMPLATE_UNSET",
            "Cannot serialize a config override without a conversation template",
            "Session configuration",
            "Set conv_template in the chat config or in the override",
            "conv_template",
        )
    })?;
    config::serialize_override(overrides, conv_template)
}

/// A live chat session bound to one model on one device.
///
/// All mutating operations take `&mut self`: a session runs at most one
/// generate/decode sequence at a time, and the borrow checker enforces
/// it. Independent sessions over separate backend handles run
/// concurrently without coordination.
///
/// Dropping the session drops the backend handle; backends release
/// their resources in `Drop`, and [`unload`](Self::unload) exists for
/// callers who want the release to happen eagerly at a known point.
pub struct ChatSession {
    backend: Box<dyn ChatBackend>,
    config: SessionConfig,
    model_path: PathBuf,
    config_path: PathBuf,
    library_path: PathBuf,
    device: Device,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("config", &self.config)
            .field("model_path", &self.model_path)
            .field("config_path", &self.config_path)
            .field("library_path", &self.library_path)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

impl ChatSession {
    /// Resolve `model` and bind it to a freshly created backend.
    ///
    /// Order: device, model directory, config document plus override,
    /// backend library, backend creation, backend reload. Any failure
    /// aborts the whole construction; no partially-initialized session
    /// escapes.
    pub async fn new(
        model: &str,
        options: SessionOptions,
        factory: &dyn BackendFactory,
    ) -> Result<ChatSession> {
        let device = Device::resolve(&options.device, options.device_id, factory)?;
        let (model_path, config_path) = resolve::find_model_dir(model)?;
        let config = config::load_session_config(&config_path, options.config_override.as_ref())?;
        let library_path = resolve::find_backend_library(
            model,
            &model_path,
            &config,
            options.library_path.as_deref(),
            device.device_type,
        )?;

        let override_json = override_payload(&config, options.config_override.as_ref())?;
        let mut backend = factory.create(device)?;
        backend
            .reload(&library_path, &model_path, &override_json)
            .await?;

        info!(
            "Session ready: model {} on {} (library {})",
            model_path.display(),
            device,
            library_path.display()
        );

        Ok(ChatSession {
            backend,
            config,
            model_path,
            config_path,
            library_path,
            device,
        })
    }

    /// Run one full generation: prefill `prompt` as a complete turn,
    /// decode until the backend reports a stop condition, and stream
    /// reconciled output deltas to `sink` every `poll_interval` decode
    /// steps.
    ///
    /// The final reconciliation is guaranteed regardless of cadence and
    /// the sink's end-of-stream signal always follows it; empty deltas
    /// are never forwarded. The call holds the session exclusively until
    /// the stop condition. Each awaited decode step is the boundary
    /// where a caller-imposed timeout or cancellation takes effect.
    pub async fn generate(
        &mut self,
        prompt: &str,
        sink: &mut dyn StreamSink,
        poll_interval: usize,
    ) -> Result<()> {
        if poll_interval == 0 {
            return Err(CoreError::invalid_parameter(
                "POLL_INTERVAL_ZERO",
                "poll_interval must be at least 1",
                "Generate loop",
                "Use 1 to reconcile after every decode step",
                "poll_interval",
                "0",
                ">= 1",
            ));
        }

        debug!("Generating with poll interval {}", poll_interval);
        self.backend.prefill(prompt, true, PlaceInPrompt::All).await?;

        let mut stream = StreamState::new();
        let mut step = 0usize;
        while !self.backend.stopped().await? {
            self.backend.decode().await?;
            let stop_hit = self.backend.stopped().await?;
            if stop_hit || step % poll_interval == 0 {
                self.flush_delta(&mut stream, sink).await?;
            }
            step += 1;
        }
        // Covers a stop reached during prefill's first decoded token and
        // any tail the cadence missed.
        self.flush_delta(&mut stream, sink).await?;
        sink.on_end().map_err(CoreError::from)?;
        Ok(())
    }

    async fn flush_delta(
        &mut self,
        stream: &mut StreamState,
        sink: &mut dyn StreamSink,
    ) -> Result<()> {
        let message = self.backend.get_message().await?;
        let delta = stream.advance(&message);
        if !delta.is_empty() {
            sink.on_delta(&delta).map_err(CoreError::from)?;
        }
        Ok(())
    }

    /// Clear the conversation, optionally layering a new override.
    ///
    /// The re-merge runs first, against the original config document; if
    /// it fails, the previous working configuration stays committed and
    /// the backend is untouched. The override reaches the backend as a
    /// partial update, so fields it does not name keep their current
    /// values. Model and backend binding are unaffected.
    pub async fn reset(&mut self, overrides: Option<&SessionConfig>) -> Result<()> {
        match overrides {
            Some(_) => {
                let merged = config::load_session_config(&self.config_path, overrides)?;
                let payload = override_payload(&merged, overrides)?;
                self.backend.reset_chat().await?;
                self.backend.load_json_override(&payload, true).await?;
                self.config = merged;
            }
            None => {
                self.backend.reset_chat().await?;
            }
        }
        debug!("Session reset");
        Ok(())
    }

    /// Bind a different model into this session's existing backend.
    ///
    /// Resolution runs exactly as in [`new`](Self::new), keeping the
    /// device binding; the session's paths and configuration commit only
    /// after the backend accepts the new model.
    pub async fn reload(
        &mut self,
        model: &str,
        overrides: Option<&SessionConfig>,
        library_path: Option<&Path>,
    ) -> Result<()> {
        let (model_path, config_path) = resolve::find_model_dir(model)?;
        let config = config::load_session_config(&config_path, overrides)?;
        let resolved_library = resolve::find_backend_library(
            model,
            &model_path,
            &config,
            library_path,
            self.device.device_type,
        )?;
        let override_json = override_payload(&config, overrides)?;

        self.backend
            .reload(&resolved_library, &model_path, &override_json)
            .await?;

        info!("Session rebound: model {}", model_path.display());
        self.config = config;
        self.model_path = model_path;
        self.config_path = config_path;
        self.library_path = resolved_library;
        Ok(())
    }

    /// Embed `input` with the given prompt placement. The handle is
    /// opaque and only meaningful to this session's backend.
    pub async fn embed(&mut self, input: &str, place: PlaceInPrompt) -> Result<Embedding> {
        self.backend.embed(input, place).await
    }

    /// Feed text into the conversation without running the generate loop
    pub async fn prefill(
        &mut self,
        input: &str,
        decode_next_token: bool,
        place: PlaceInPrompt,
    ) -> Result<()> {
        self.backend.prefill(input, decode_next_token, place).await
    }

    /// Prefill from a precomputed embedding
    pub async fn prefill_with_embedding(
        &mut self,
        embedding: Embedding,
        decode_next_token: bool,
    ) -> Result<()> {
        self.backend
            .prefill_with_embedding(embedding, decode_next_token)
            .await
    }

    /// Advance generation by one token
    pub async fn decode(&mut self) -> Result<()> {
        self.backend.decode().await
    }

    /// Whether the current generation has stopped
    pub async fn stopped(&self) -> Result<bool> {
        self.backend.stopped().await
    }

    /// Full accumulated output message
    pub async fn message(&self) -> Result<String> {
        self.backend.get_message().await
    }

    /// User role display name
    pub async fn role0(&self) -> Result<String> {
        self.backend.get_role0().await
    }

    /// Model role display name
    pub async fn role1(&self) -> Result<String> {
        self.backend.get_role1().await
    }

    /// Effective backend configuration as JSON
    pub async fn config_json(&self) -> Result<String> {
        self.backend.get_config_json().await
    }

    /// Push a raw JSON override straight to the backend
    pub async fn load_json_override(&mut self, json: &str, partial_update: bool) -> Result<()> {
        self.backend.load_json_override(json, partial_update).await
    }

    /// Human-readable prefill/decode throughput summary
    pub async fn runtime_stats_text(&self) -> Result<String> {
        self.backend.runtime_stats_text().await
    }

    /// Clear the runtime throughput counters
    pub async fn reset_runtime_stats(&mut self) -> Result<()> {
        self.backend.reset_runtime_stats().await
    }

    /// Run the configured system prompts before the first user turn
    pub async fn process_system_prompts(&mut self) -> Result<()> {
        self.backend.process_system_prompts().await
    }

    /// Synthetic prefill/decode pass for measurement
    pub async fn evaluate(&mut self, token_len: usize, generate_len: usize) -> Result<()> {
        self.backend.evaluate(token_len, generate_len).await
    }

    /// Release backend resources now instead of at drop
    pub async fn unload(&mut self) -> Result<()> {
        self.backend.unload().await
    }

    /// Effective merged configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Resolved model directory
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Resolved config document path
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Resolved backend library path
    pub fn library_path(&self) -> &Path {
        &self.library_path
    }

    /// Device this session is bound to
    pub fn device(&self) -> Device {
        self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceType;
    use crate::stream::StreamDelta;
    use crate::testing::{BackendCall, RecordingSink, ScriptedBackend};

    fn session_over(backend: ScriptedBackend) -> ChatSession {
        ChatSession {
            backend: Box::new(backend),
            config: SessionConfig::default(),
            model_path: PathBuf::from("model"),
            config_path: PathBuf::from("model/chat-config.json"),
            library_path: PathBuf::from("model/lib-cpu.so"),
            device: Device::new(DeviceType::Cpu, 0),
        }
    }

    #[tokio::test]
    async fn test_generate_streams_reconciled_deltas() {
        let backend = ScriptedBackend::new(vec![
            "".to_string(),
            "Hi".to_string(),
            "Hi!".to_string(),
        ]);
        let calls = backend.calls();
        let mut session = session_over(backend);
        let mut sink = RecordingSink::new();

        session.generate("hello", &mut sink, 1).await.unwrap();

        assert_eq!(
            sink.deltas,
            vec![
                StreamDelta {
                    erase: 0,
                    append: b"Hi".to_vec(),
                },
                StreamDelta {
                    erase: 0,
                    append: b"!".to_vec(),
                },
            ]
        );
        assert!(sink.ended);

        let calls = calls.lock().unwrap();
        assert_eq!(
            calls[0],
            BackendCall::Prefill {
                input: "hello".to_string(),
                decode_next_token: true,
                place: PlaceInPrompt::All,
            }
        );
        assert_eq!(
            calls.iter().filter(|c| **c == BackendCall::Decode).count(),
            3
        );
    }

    #[tokio::test]
    async fn test_generate_coarse_interval_still_flushes_tail() {
        let backend = ScriptedBackend::new(vec![
            "H".to_string(),
            "He".to_string(),
            "Hey".to_string(),
        ]);
        let mut session = session_over(backend);
        let mut sink = RecordingSink::new();

        session.generate("hello", &mut sink, 10).await.unwrap();

        // Cadence flushes "H"; the stop-step flush carries the rest.
        assert_eq!(
            sink.deltas,
            vec![
                StreamDelta {
                    erase: 0,
                    append: b"H".to_vec(),
                },
                StreamDelta {
                    erase: 0,
                    append: b"ey".to_vec(),
                },
            ]
        );
        assert!(sink.ended);
        assert_eq!(sink.text(), "Hey");
    }

    #[tokio::test]
    async fn test_generate_rejects_zero_poll_interval() {
        let backend = ScriptedBackend::new(vec!["Hi".to_string()]);
        let mut session = session_over(backend);
        let mut sink = RecordingSink::new();

        let err = session.generate("hello", &mut sink, 0).await.unwrap_err();
        assert_eq!(err.code(), "POLL_INTERVAL_ZERO");
        assert!(sink.deltas.is_empty());
        assert!(!sink.ended);
    }

    #[tokio::test]
    async fn test_generate_with_empty_script_signals_end_only() {
        let backend = ScriptedBackend::new(Vec::new());
        let mut session = session_over(backend);
        let mut sink = RecordingSink::new();

        session.generate("hello", &mut sink, 2).await.unwrap();
        assert!(sink.deltas.is_empty());
        assert!(sink.ended);
    }

    #[tokio::test]
    async fn test_reset_without_override_only_clears_history() {
        let backend = ScriptedBackend::new(vec!["Hi".to_string()]);
        let calls = backend.calls();
        let mut session = session_over(backend);

        session.reset(None).await.unwrap();

        assert_eq!(calls.lock().unwrap().as_slice(), &[BackendCall::ResetChat]);
    }

    #[tokio::test]
    async fn test_low_level_passthroughs_reach_backend() {
        let backend = ScriptedBackend::new(vec!["Hi".to_string()]);
        let calls = backend.calls();
        let mut session = session_over(backend);

        session.reset_runtime_stats().await.unwrap();
        session.process_system_prompts().await.unwrap();
        session.evaluate(16, 4).await.unwrap();
        let embedding = session.embed("abc", PlaceInPrompt::Middle).await.unwrap();
        session.prefill_with_embedding(embedding, false).await.unwrap();
        session.unload().await.unwrap();

        assert_eq!(
            calls.lock().unwrap().as_slice(),
            &[
                BackendCall::ResetRuntimeStats,
                BackendCall::ProcessSystemPrompts,
                BackendCall::Evaluate {
                    token_len: 16,
                    generate_len: 4,
                },
                BackendCall::Embed {
                    input: "abc".to_string(),
                    place: PlaceInPrompt::Middle,
                },
                BackendCall::PrefillWithEmbedding {
                    input: "abc".to_string(),
                    decode_next_token: false,
                },
                BackendCall::Unload,
            ]
        );
    }
}
