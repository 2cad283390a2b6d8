//! Scripted backend for tests
//!
//! [`ScriptedBackend`] plays back a fixed sequence of message snapshots,
//! one per decode call, and records every capability call it receives so
//! tests can assert on exact payloads. [`ScriptedFactory`] hands out
//! such backends and answers device probes from a fixed availability
//! list. Shipped as a regular module because the factory seam is part of
//! the public API and downstream crates test against it too.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::backend::{BackendFactory, ChatBackend, Embedding, PlaceInPrompt};
use crate::device::{Device, DeviceType};
use crate::stream::{StreamDelta, StreamSink};
use crate::Result;

/// One recorded capability call
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Reload {
        library: PathBuf,
        model_path: PathBuf,
        override_json: String,
    },
    Unload,
    Prefill {
        input: String,
        decode_next_token: bool,
        place: PlaceInPrompt,
    },
    PrefillWithEmbedding {
        input: String,
        decode_next_token: bool,
    },
    Decode,
    ResetChat,
    LoadJsonOverride {
        json: String,
        partial_update: bool,
    },
    Embed {
        input: String,
        place: PlaceInPrompt,
    },
    ResetRuntimeStats,
    ProcessSystemPrompts,
    Evaluate {
        token_len: usize,
        generate_len: usize,
    },
}

/// Shared call log; the factory clones it into every backend it creates
/// so tests keep visibility after the session takes ownership.
pub type CallLog = Arc<Mutex<Vec<BackendCall>>>;

/// Backend that replays scripted message snapshots.
///
/// `decode` advances a cursor through the script; `get_message` returns
/// the snapshot at the cursor and `stopped` turns true once the script
/// is exhausted. `reset_chat` rewinds the cursor.
pub struct ScriptedBackend {
    script: Vec<String>,
    cursor: Mutex<usize>,
    calls: CallLog,
    config_json: String,
}

impl ScriptedBackend {
    pub fn new(script: Vec<String>) -> Self {
        Self::with_log(script, Arc::new(Mutex::new(Vec::new())))
    }

    pub fn with_log(script: Vec<String>, calls: CallLog) -> Self {
        Self {
            script,
            cursor: Mutex::new(0),
            calls,
            config_json: "{}".to_string(),
        }
    }

    /// Handle to the call log, valid after the backend moves elsewhere
    pub fn calls(&self) -> CallLog {
        Arc::clone(&self.calls)
    }

    fn record(&self, call: BackendCall) {
        self.calls
            .lock()
            .expect("call log poisoned")
            .push(call);
    }

    fn cursor(&self) -> usize {
        *self.cursor.lock().expect("cursor poisoned")
    }

    fn set_cursor(&self, value: usize) {
        *self.cursor.lock().expect("cursor poisoned") = value;
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn reload(
        &mut self,
        library: &Path,
        model_path: &Path,
        override_json: &str,
    ) -> Result<()> {
        self.record(BackendCall::Reload {
            library: library.to_path_buf(),
            model_path: model_path.to_path_buf(),
            override_json: override_json.to_string(),
        });
        Ok(())
    }

    async fn unload(&mut self) -> Result<()> {
        self.record(BackendCall::Unload);
        Ok(())
    }

    async fn prefill(
        &mut self,
        input: &str,
        decode_next_token: bool,
        place: PlaceInPrompt,
    ) -> Result<()> {
        self.record(BackendCall::Prefill {
            input: input.to_string(),
            decode_next_token,
            place,
        });
        Ok(())
    }

    async fn prefill_with_embedding(
        &mut self,
        embedding: Embedding,
        decode_next_token: bool,
    ) -> Result<()> {
        let input = embedding.downcast::<String>().unwrap_or_default();
        self.record(BackendCall::PrefillWithEmbedding {
            input,
            decode_next_token,
        });
        Ok(())
    }

    async fn decode(&mut self) -> Result<()> {
        self.record(BackendCall::Decode);
        let cursor = self.cursor();
        if cursor < self.script.len() {
            self.set_cursor(cursor + 1);
        }
        Ok(())
    }

    async fn reset_chat(&mut self) -> Result<()> {
        self.record(BackendCall::ResetChat);
        self.set_cursor(0);
        Ok(())
    }

    async fn load_json_override(&mut self, json: &str, partial_update: bool) -> Result<()> {
        self.record(BackendCall::LoadJsonOverride {
            json: json.to_string(),
            partial_update,
        });
        Ok(())
    }

    async fn stopped(&self) -> Result<bool> {
        Ok(self.cursor() >= self.script.len())
    }

    async fn get_message(&self) -> Result<String> {
        let cursor = self.cursor();
        if cursor == 0 {
            return Ok(String::new());
        }
        Ok(self.script[cursor - 1].clone())
    }

    async fn get_config_json(&self) -> Result<String> {
        Ok(self.config_json.clone())
    }

    async fn embed(&mut self, input: &str, place: PlaceInPrompt) -> Result<Embedding> {
        self.record(BackendCall::Embed {
            input: input.to_string(),
            place,
        });
        Ok(Embedding::new(input.to_string()))
    }

    async fn get_role0(&self) -> Result<String> {
        Ok("USER".to_string())
    }

    async fn get_role1(&self) -> Result<String> {
        Ok("ASSISTANT".to_string())
    }

    async fn runtime_stats_text(&self) -> Result<String> {
        Ok("prefill: 0.0 tok/s, decode: 0.0 tok/s".to_string())
    }

    async fn reset_runtime_stats(&mut self) -> Result<()> {
        self.record(BackendCall::ResetRuntimeStats);
        Ok(())
    }

    async fn process_system_prompts(&mut self) -> Result<()> {
        self.record(BackendCall::ProcessSystemPrompts);
        Ok(())
    }

    async fn evaluate(&mut self, token_len: usize, generate_len: usize) -> Result<()> {
        self.record(BackendCall::Evaluate {
            token_len,
            generate_len,
        });
        Ok(())
    }
}

/// Sink that captures deltas and the end-of-stream signal for assertion
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub deltas: Vec<StreamDelta>,
    pub ended: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appended bytes of every delta, concatenated and decoded
    pub fn text(&self) -> String {
        let bytes: Vec<u8> = self
            .deltas
            .iter()
            .flat_map(|delta| delta.append.iter().copied())
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl StreamSink for RecordingSink {
    fn on_delta(&mut self, delta: &StreamDelta) -> io::Result<()> {
        self.deltas.push(delta.clone());
        Ok(())
    }

    fn on_end(&mut self) -> io::Result<()> {
        self.ended = true;
        Ok(())
    }
}

/// Factory producing [`ScriptedBackend`]s that share one call log
pub struct ScriptedFactory {
    script: Vec<String>,
    available: Vec<DeviceType>,
    calls: CallLog,
    created: Mutex<Vec<Device>>,
}

impl ScriptedFactory {
    pub fn new(script: Vec<String>) -> Self {
        Self {
            script,
            available: Vec::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
            created: Mutex::new(Vec::new()),
        }
    }

    /// Device types the factory reports as available to auto-detection
    pub fn with_available(mut self, available: Vec<DeviceType>) -> Self {
        self.available = available;
        self
    }

    /// Handle to the call log shared by every created backend
    pub fn calls(&self) -> CallLog {
        Arc::clone(&self.calls)
    }

    /// Devices that backends were created for, in order
    pub fn created_devices(&self) -> Vec<Device> {
        self.created.lock().expect("created log poisoned").clone()
    }
}

impl BackendFactory for ScriptedFactory {
    fn device_available(&self, device_type: DeviceType) -> bool {
        self.available.contains(&device_type)
    }

    fn create(&self, device: Device) -> Result<Box<dyn ChatBackend>> {
        self.created
            .lock()
            .expect("created log poisoned")
            .push(device);
        Ok(Box::new(ScriptedBackend::with_log(
            self.script.clone(),
            Arc::clone(&self.calls),
        )))
    }
}
