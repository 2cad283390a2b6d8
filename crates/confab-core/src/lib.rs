//! Confab Core - Chat Session Controller
//!
//! This crate provides the host-side session controller for the Confab
//! chat runtime: configuration layering, model and backend-library
//! resolution, and the incremental prefill/decode/streaming loop driven
//! against an opaque inference backend.

// Module declarations
pub mod backend;
pub mod config;
pub mod device;
pub mod resolve;
pub mod session;
pub mod stream;
pub mod testing;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// Model directory resolution errors
    #[error("Model not found [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    ModelNotFound {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
        searched_paths: Vec<std::path::PathBuf>,
    },

    /// Backend library resolution errors
    #[error("Library not found [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    LibraryNotFound {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
        searched_paths: Vec<std::path::PathBuf>,
    },

    /// Device name and selection errors
    #[error("Device error [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    InvalidDevice {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
        device_name: Option<String>,
    },

    /// Configuration parsing and validation errors
    #[error("Configuration error [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    Configuration {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
        config_path: Option<std::path::PathBuf>,
        field_name: Option<String>,
    },

    /// Input validation and parameter errors
    #[error("Invalid input [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    InvalidInput {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
        parameter_name: Option<String>,
        value: Option<String>,
        valid_range: Option<String>,
    },

    /// Failures raised inside the inference backend, carried unchanged
    #[error("Backend error [{code}]: {message}")]
    Backend {
        code: &'static str,
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// File system and I/O errors
    #[error("IO error [{code}]: {message}\nPath: {path:?}\nSuggestion: {suggestion}")]
    Io {
        code: &'static str,
        message: String,
        path: Option<std::path::PathBuf>,
        suggestion: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON encode/decode errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create a model-not-found error listing every searched path
    pub fn model_not_found<S1, S2, S3>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
        searched_paths: Vec<std::path::PathBuf>,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::ModelNotFound {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
            searched_paths,
        }
    }

    /// Create a library-not-found error listing every searched path
    pub fn library_not_found<S1, S2, S3>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
        searched_paths: Vec<std::path::PathBuf>,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::LibraryNotFound {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
            searched_paths,
        }
    }

    /// Create a device error for an unrecognized device name
    pub fn invalid_device<S1, S2, S3, S4>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
        device_name: S4,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
        S4: Into<String>,
    {
        Self::InvalidDevice {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
            device_name: Some(device_name.into()),
        }
    }

    /// Create a configuration error with context
    pub fn configuration<S1, S2, S3>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::Configuration {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
            config_path: None,
            field_name: None,
        }
    }

    /// Create a configuration error tied to a config file
    pub fn configuration_with_path<S1, S2, S3, P>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
        path: P,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
        P: Into<std::path::PathBuf>,
    {
        Self::Configuration {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
            config_path: Some(path.into()),
            field_name: None,
        }
    }

    /// Create a configuration error naming the offending field
    pub fn configuration_field<S1, S2, S3, S4>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
        field_name: S4,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
        S4: Into<String>,
    {
        Self::Configuration {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
            config_path: None,
            field_name: Some(field_name.into()),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input<S1, S2, S3>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::InvalidInput {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
            parameter_name: None,
            value: None,
            valid_range: None,
        }
    }

    /// Create an invalid input error with parameter validation details
    pub fn invalid_parameter<S1, S2, S3, S4, S5, S6>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
        param_name: S4,
        value: S5,
        valid_range: S6,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
        S4: Into<String>,
        S5: Into<String>,
        S6: Into<String>,
    {
        Self::InvalidInput {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
            parameter_name: Some(param_name.into()),
            value: Some(value.into()),
            valid_range: Some(valid_range.into()),
        }
    }

    /// Create a backend error from a plain message
    pub fn backend<S1>(message: S1) -> Self
    where
        S1: Into<String>,
    {
        Self::Backend {
            code: "BACKEND_FAILURE",
            message: message.into(),
            source: None,
        }
    }

    /// Create a backend error preserving the original cause
    pub fn backend_with_source<S1>(message: S1, source: anyhow::Error) -> Self
    where
        S1: Into<String>,
    {
        Self::Backend {
            code: "BACKEND_FAILURE",
            message: message.into(),
            source: Some(source),
        }
    }

    /// Get the error code for programmatic handling
    pub fn code(&self) -> &'static str {
        match self {
            Self::ModelNotFound { code, .. } => code,
            Self::LibraryNotFound { code, .. } => code,
            Self::InvalidDevice { code, .. } => code,
            Self::Configuration { code, .. } => code,
            Self::InvalidInput { code, .. } => code,
            Self::Backend { code, .. } => code,
            Self::Io { code, .. } => code,
            Self::Json(_) => "JSON_ERROR",
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        let (code, suggestion) = match err.kind() {
            std::io::ErrorKind::NotFound => (
                "IO_FILE_NOT_FOUND",
                "Check that the file path is correct and the file exists",
            ),
            std::io::ErrorKind::PermissionDenied => (
                "IO_PERMISSION_DENIED",
                "Check file permissions or run with appropriate privileges",
            ),
            std::io::ErrorKind::InvalidData => (
                "IO_INVALID_DATA",
                "The file may be corrupted or in an unexpected format",
            ),
            _ => (
                "IO_UNKNOWN",
                "Check the file system and try the operation again",
            ),
        };

        Self::Io {
            code,
            message: err.to_string(),
            path: None,
            suggestion: suggestion.to_string(),
            source: err,
        }
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        Self::Backend {
            code: "BACKEND_FAILURE",
            message: err.to_string(),
            source: Some(err),
        }
    }
}

/// Prelude module for common imports
pub mod prelude {
    pub use crate::{
        backend::{BackendFactory, ChatBackend, Embedding, PlaceInPrompt},
        config::{
            load_session_config, serialize_override, ConversationConfig, SeparatorStyle,
            SessionConfig,
        },
        device::{Device, DeviceType},
        resolve::{find_backend_library, find_model_dir, CHAT_CONFIG_FILE},
        session::{ChatSession, SessionOptions},
        stream::{reconcile, StdoutSink, StreamDelta, StreamSink, StreamState},
        CoreError, Result,
    };
}

// Re-export key types at the crate root
pub use backend::{BackendFactory, ChatBackend, Embedding, PlaceInPrompt};
pub use config::{ConversationConfig, SeparatorStyle, SessionConfig};
pub use device::{Device, DeviceType};
pub use session::{ChatSession, SessionOptions};
pub use stream::{StreamDelta, StreamSink};

pub mod error {
    pub use super::{CoreError, Result};
}
