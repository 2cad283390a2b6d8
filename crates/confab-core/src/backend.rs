//! Inference backend capability
//!
//! The session controller consumes text generation through this trait
//! and never implements it. Every operation is a named method with a
//! fixed signature; nothing is dispatched by string, and integer wire
//! values appear only where an implementation talks to its native
//! runtime.

use std::any::Any;
use std::path::Path;

use async_trait::async_trait;

use crate::device::{Device, DeviceType};
use crate::Result;

/// How a text chunk is decorated with role and separator text when it
/// enters the ongoing conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceInPrompt {
    /// Decorate both sides: a complete turn
    All,

    /// Decorate the leading side only
    Begin,

    /// Decorate neither side
    Middle,

    /// Decorate the trailing side only
    End,
}

impl PlaceInPrompt {
    /// Ordinal used at the native backend boundary; the enum itself is
    /// the only form that appears in this crate's APIs.
    pub fn ordinal(self) -> i32 {
        match self {
            PlaceInPrompt::All => 0,
            PlaceInPrompt::Begin => 1,
            PlaceInPrompt::Middle => 2,
            PlaceInPrompt::End => 3,
        }
    }
}

/// Opaque embedding handle produced by [`ChatBackend::embed`] and
/// consumed by [`ChatBackend::prefill_with_embedding`].
///
/// The controller never inspects it; the concrete type is whatever the
/// backend implementation chooses to store.
pub struct Embedding {
    inner: Box<dyn Any + Send>,
}

impl Embedding {
    pub fn new<T: Any + Send>(value: T) -> Self {
        Self {
            inner: Box::new(value),
        }
    }

    /// Recover the concrete value, if `T` is what the backend stored
    pub fn downcast<T: Any>(self) -> Option<T> {
        self.inner.downcast::<T>().ok().map(|boxed| *boxed)
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

impl std::fmt::Debug for Embedding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Embedding").finish_non_exhaustive()
    }
}

/// The capability set the session controller drives.
///
/// Implementations own all generation state: conversation history, KV
/// state, stop detection, runtime counters. The controller issues calls
/// strictly in sequence; implementations never see two operations on one
/// handle at once.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Bind a model: load the backend library at `library`, read the
    /// model from `model_path`, and apply `override_json` (empty string
    /// for none) on top of the model's own config document.
    async fn reload(
        &mut self,
        library: &Path,
        model_path: &Path,
        override_json: &str,
    ) -> Result<()>;

    /// Release model resources eagerly. Dropping the backend must also
    /// release them; this exists for callers who want the release
    /// deterministic.
    async fn unload(&mut self) -> Result<()>;

    /// Feed `input` into the conversation, decorated per `place`. With
    /// `decode_next_token` set, the backend also decodes the first
    /// output token before returning.
    async fn prefill(
        &mut self,
        input: &str,
        decode_next_token: bool,
        place: PlaceInPrompt,
    ) -> Result<()>;

    /// Like [`prefill`](Self::prefill), from a precomputed embedding
    async fn prefill_with_embedding(
        &mut self,
        embedding: Embedding,
        decode_next_token: bool,
    ) -> Result<()>;

    /// Advance generation by exactly one token
    async fn decode(&mut self) -> Result<()>;

    /// Clear the conversation history, keeping the loaded model
    async fn reset_chat(&mut self) -> Result<()>;

    /// Apply a JSON config override to the live session. With
    /// `partial_update` set, fields absent from `json` keep their
    /// current values; otherwise the whole config is replaced.
    async fn load_json_override(&mut self, json: &str, partial_update: bool) -> Result<()>;

    /// True once the current generation has hit a stop condition
    async fn stopped(&self) -> Result<bool>;

    /// The full accumulated output message so far, never a delta
    async fn get_message(&self) -> Result<String>;

    /// The effective configuration as a JSON document
    async fn get_config_json(&self) -> Result<String>;

    /// Embed `input`, decorated per `place`
    async fn embed(&mut self, input: &str, place: PlaceInPrompt) -> Result<Embedding>;

    /// Display name of the user role
    async fn get_role0(&self) -> Result<String>;

    /// Display name of the model role
    async fn get_role1(&self) -> Result<String>;

    /// Human-readable prefill/decode throughput summary
    async fn runtime_stats_text(&self) -> Result<String>;

    /// Clear the runtime throughput counters
    async fn reset_runtime_stats(&mut self) -> Result<()>;

    /// Run the configured system prompts through the model before the
    /// first user turn
    async fn process_system_prompts(&mut self) -> Result<()>;

    /// Run a synthetic workload: prefill `token_len` placeholder tokens,
    /// then decode `generate_len` steps. Measurement only; the
    /// conversation is not meaningful afterwards.
    async fn evaluate(&mut self, token_len: usize, generate_len: usize) -> Result<()>;
}

/// Creates backends bound to a device and answers the availability
/// probes behind device auto-detection.
///
/// Injected at session construction; tests substitute a scripted
/// implementation instead of touching any native runtime.
pub trait BackendFactory: Send + Sync {
    /// Whether `device_type` is usable on this host
    fn device_available(&self, device_type: DeviceType) -> bool;

    /// Instantiate a backend bound to `device`
    fn create(&self, device: Device) -> Result<Box<dyn ChatBackend>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_place_in_prompt_ordinals() {
        assert_eq!(PlaceInPrompt::All.ordinal(), 0);
        assert_eq!(PlaceInPrompt::Begin.ordinal(), 1);
        assert_eq!(PlaceInPrompt::Middle.ordinal(), 2);
        assert_eq!(PlaceInPrompt::End.ordinal(), 3);
    }

    #[test]
    fn test_embedding_downcast_roundtrip() {
        let embedding = Embedding::new(vec![1u32, 2, 3]);
        assert!(embedding.downcast_ref::<Vec<u32>>().is_some());
        assert_eq!(embedding.downcast::<Vec<u32>>(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_embedding_downcast_wrong_type() {
        let embedding = Embedding::new(String::from("tokens"));
        assert!(embedding.downcast::<Vec<u32>>().is_none());
    }
}
