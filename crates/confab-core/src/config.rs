//! Session and conversation configuration layering
//!
//! A model directory carries one JSON config document. Callers may layer
//! a sparse override on top of it: every set field of the override wins,
//! every unset field falls back to the document, and the nested
//! conversation record merges the same way one level deep. Overrides are
//! re-serialized for the backend with unset fields omitted entirely.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{CoreError, Result};

/// How the conversation template joins turns when rendering the prompt.
///
/// Config documents store the integer ordinal (0 = chat turns,
/// 1 = raw continuation); the integer exists only in that wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SeparatorStyle {
    /// Role-decorated chat turns
    ChatBot,

    /// Raw language-model continuation, no role decoration
    PureLm,
}

impl From<SeparatorStyle> for u8 {
    fn from(style: SeparatorStyle) -> u8 {
        match style {
            SeparatorStyle::ChatBot => 0,
            SeparatorStyle::PureLm => 1,
        }
    }
}

impl TryFrom<u8> for SeparatorStyle {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(SeparatorStyle::ChatBot),
            1 => Ok(SeparatorStyle::PureLm),
            other => Err(format!("unknown separator style ordinal: {}", other)),
        }
    }
}

/// Partial override of the conversation template.
///
/// All fields are optional; an unset field never clobbers the value the
/// base document defined.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Template name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// System prompt prepended to the conversation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Role display names, user first
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,

    /// Seeded message history as (role, message) pairs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<(String, String)>>,

    /// Number of seeded messages to skip when replaying history
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,

    /// Turn separator style
    #[serde(skip_serializing_if = "Option::is_none")]
    pub separator_style: Option<SeparatorStyle>,

    /// Separators emitted after the user and model turns
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seps: Option<Vec<String>>,

    /// Separator between a role name and its message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_msg_sep: Option<String>,

    /// Separator after a role name with no message yet
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_empty_sep: Option<String>,

    /// Generation stops when this string appears
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_str: Option<String>,

    /// Generation stops on any of these token ids
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_tokens: Option<Vec<u32>>,

    /// Whether a beginning-of-sequence token starts the prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub add_bos: Option<bool>,
}

impl ConversationConfig {
    /// Returns a copy of `self` with every set field of `overrides`
    /// applied on top.
    pub fn merged_with(&self, overrides: &ConversationConfig) -> ConversationConfig {
        ConversationConfig {
            name: overrides.name.clone().or_else(|| self.name.clone()),
            system: overrides.system.clone().or_else(|| self.system.clone()),
            roles: overrides.roles.clone().or_else(|| self.roles.clone()),
            messages: overrides.messages.clone().or_else(|| self.messages.clone()),
            offset: overrides.offset.or(self.offset),
            separator_style: overrides.separator_style.or(self.separator_style),
            seps: overrides.seps.clone().or_else(|| self.seps.clone()),
            role_msg_sep: overrides
                .role_msg_sep
                .clone()
                .or_else(|| self.role_msg_sep.clone()),
            role_empty_sep: overrides
                .role_empty_sep
                .clone()
                .or_else(|| self.role_empty_sep.clone()),
            stop_str: overrides.stop_str.clone().or_else(|| self.stop_str.clone()),
            stop_tokens: overrides
                .stop_tokens
                .clone()
                .or_else(|| self.stop_tokens.clone()),
            add_bos: overrides.add_bos.or(self.add_bos),
        }
    }
}

/// Session configuration, layered from the model's config document and
/// an optional sparse override.
///
/// All fields are optional before the merge; afterwards every field the
/// document defined is populated. Serialization omits unset fields, so a
/// sparse override round-trips as exactly its set keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Backend library name the model was compiled against
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_lib: Option<String>,

    /// Local model identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_id: Option<String>,

    /// Conversation template name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conv_template: Option<String>,

    /// Sampling temperature (documents default to 0.7)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Repetition penalty, must be positive (documents default to 1.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repetition_penalty: Option<f32>,

    /// Nucleus sampling threshold in [0, 1] (documents default to 0.95)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Target mean generation length in tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_gen_len: Option<usize>,

    /// Hard cap on generation length in tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_gen_len: Option<usize>,

    /// Fill factor applied when shifting the KV state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shift_fill_factor: Option<f32>,

    /// Tokenizer asset files inside the model directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokenizer_files: Option<Vec<String>>,

    /// Conversation template override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conv_config: Option<ConversationConfig>,

    /// Model architecture category
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_category: Option<String>,

    /// Model display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
}

impl SessionConfig {
    /// Returns a copy of `self` with every set field of `overrides`
    /// applied on top.
    ///
    /// The nested conversation record merges field-by-field the same
    /// way, one level deep; an override that sets only `stop_str` leaves
    /// the document's roles and separators intact.
    pub fn merged_with(&self, overrides: &SessionConfig) -> SessionConfig {
        SessionConfig {
            model_lib: overrides.model_lib.clone().or_else(|| self.model_lib.clone()),
            local_id: overrides.local_id.clone().or_else(|| self.local_id.clone()),
            conv_template: overrides
                .conv_template
                .clone()
                .or_else(|| self.conv_template.clone()),
            temperature: overrides.temperature.or(self.temperature),
            repetition_penalty: overrides.repetition_penalty.or(self.repetition_penalty),
            top_p: overrides.top_p.or(self.top_p),
            mean_gen_len: overrides.mean_gen_len.or(self.mean_gen_len),
            max_gen_len: overrides.max_gen_len.or(self.max_gen_len),
            shift_fill_factor: overrides.shift_fill_factor.or(self.shift_fill_factor),
            tokenizer_files: overrides
                .tokenizer_files
                .clone()
                .or_else(|| self.tokenizer_files.clone()),
            conv_config: match (&self.conv_config, &overrides.conv_config) {
                (Some(base), Some(over)) => Some(base.merged_with(over)),
                (None, Some(over)) => Some(over.clone()),
                (base, None) => base.clone(),
            },
            model_category: overrides
                .model_category
                .clone()
                .or_else(|| self.model_category.clone()),
            model_name: overrides
                .model_name
                .clone()
                .or_else(|| self.model_name.clone()),
        }
    }

    /// Validate the merged configuration's sampling parameters
    pub fn validate(&self) -> Result<()> {
        if let Some(temperature) = self.temperature {
            if !temperature.is_finite() || temperature < 0.0 {
                return Err(CoreError::invalid_parameter(
                    "TEMPERATURE_INVALID",
                    "Temperature must be finite and >= 0.0",
                    "Session configuration validation",
                    "Use values between 0.0 and 2.0 for reasonable generation quality",
                    "temperature",
                    temperature.to_string(),
                    "0.0 to 2.0 (typical range)",
                ));
            }
        }

        if let Some(top_p) = self.top_p {
            if !(0.0..=1.0).contains(&top_p) {
                return Err(CoreError::invalid_parameter(
                    "TOP_P_OUT_OF_RANGE",
                    "top_p must be between 0.0 and 1.0",
                    "Session configuration validation",
                    "Use values between 0.0 and 1.0 for nucleus sampling",
                    "top_p",
                    top_p.to_string(),
                    "0.0 to 1.0",
                ));
            }
        }

        if let Some(repetition_penalty) = self.repetition_penalty {
            if !(repetition_penalty > 0.0 && repetition_penalty.is_finite()) {
                return Err(CoreError::invalid_parameter(
                    "REPETITION_PENALTY_INVALID",
                    "Repetition penalty must be positive",
                    "Session configuration validation",
                    "Use values > 1.0 to penalize repetition, < 1.0 to encourage it",
                    "repetition_penalty",
                    repetition_penalty.to_string(),
                    "0.1 to 2.0 (typical range)",
                ));
            }
        }

        Ok(())
    }
}

/// Load the config document at `config_path` and layer `overrides` on
/// top of it.
///
/// The merged result is validated before it is returned; a failure here
/// leaves no state behind anywhere.
pub fn load_session_config(
    config_path: &Path,
    overrides: Option<&SessionConfig>,
) -> Result<SessionConfig> {
    let text = std::fs::read_to_string(config_path).map_err(|err| CoreError::Io {
        code: "CONFIG_READ_FAILED",
        message: format!("Failed to read chat config at {}", config_path.display()),
        path: Some(config_path.to_path_buf()),
        suggestion: "Check that the model directory is complete".to_string(),
        source: err,
    })?;

    let base: SessionConfig = serde_json::from_str(&text).map_err(|err| {
        CoreError::configuration_with_path(
            "CONFIG_PARSE_FAILED",
            format!("Failed to parse chat config: {}", err),
            format!("Reading {}", config_path.display()),
            "Check the config document for JSON syntax errors",
            config_path,
        )
    })?;

    let merged = match overrides {
        Some(overrides) => base.merged_with(overrides),
        None => base,
    };
    merged.validate()?;
    Ok(merged)
}

/// Serialize an override to the JSON payload handed to the backend's
/// override-loading operation.
///
/// Only set fields appear in the payload. The resolved conversation
/// template name is injected at top level, replacing whatever the
/// override itself carried, so the backend always receives a definite
/// template identity. A `None` override serializes to the empty string.
pub fn serialize_override(
    overrides: Option<&SessionConfig>,
    conv_template: &str,
) -> Result<String> {
    let Some(overrides) = overrides else {
        return Ok(String::new());
    };

    let mut value = serde_json::to_value(overrides)?;
    if let serde_json::Value::Object(map) = &mut value {
        map.insert(
            "conv_template".to_string(),
            serde_json::Value::String(conv_template.to_string()),
        );
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> SessionConfig {
        SessionConfig {
            model_lib: Some("vicuna-v1-7b-q4f32_0".to_string()),
            local_id: Some("vicuna-v1-7b".to_string()),
            conv_template: Some("vicuna_v1.1".to_string()),
            temperature: Some(0.7),
            repetition_penalty: Some(1.0),
            top_p: Some(0.95),
            mean_gen_len: Some(128),
            max_gen_len: Some(512),
            shift_fill_factor: Some(0.3),
            tokenizer_files: Some(vec!["tokenizer.model".to_string()]),
            conv_config: Some(ConversationConfig {
                roles: Some(vec!["USER".to_string(), "ASSISTANT".to_string()]),
                stop_str: Some("</s>".to_string()),
                ..Default::default()
            }),
            model_category: Some("llama".to_string()),
            model_name: Some("vicuna-v1-7b".to_string()),
        }
    }

    #[test]
    fn test_merge_set_fields_win() {
        let base = base_config();
        let overrides = SessionConfig {
            temperature: Some(0.2),
            max_gen_len: Some(64),
            ..Default::default()
        };

        let merged = base.merged_with(&overrides);
        assert_eq!(merged.temperature, Some(0.2));
        assert_eq!(merged.max_gen_len, Some(64));
    }

    #[test]
    fn test_merge_unset_fields_fall_back() {
        let base = base_config();
        let overrides = SessionConfig {
            temperature: Some(0.2),
            ..Default::default()
        };

        let merged = base.merged_with(&overrides);
        assert_eq!(merged.top_p, base.top_p);
        assert_eq!(merged.model_lib, base.model_lib);
        assert_eq!(merged.conv_template, base.conv_template);
        assert_eq!(merged.tokenizer_files, base.tokenizer_files);
    }

    #[test]
    fn test_merge_with_empty_override_is_identity() {
        let base = base_config();
        let merged = base.merged_with(&SessionConfig::default());
        assert_eq!(merged, base);
    }

    #[test]
    fn test_nested_conversation_merge_is_field_by_field() {
        let base = base_config();
        let overrides = SessionConfig {
            conv_config: Some(ConversationConfig {
                system: Some("You are terse.".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let merged = base.merged_with(&overrides);
        let conv = merged.conv_config.unwrap();
        assert_eq!(conv.system.as_deref(), Some("You are terse."));
        // Untouched nested fields survive from the document.
        assert_eq!(
            conv.roles,
            Some(vec!["USER".to_string(), "ASSISTANT".to_string()])
        );
        assert_eq!(conv.stop_str.as_deref(), Some("</s>"));
    }

    #[test]
    fn test_serialize_override_omits_unset_fields() {
        let overrides = SessionConfig {
            top_p: Some(0.8),
            ..Default::default()
        };

        let payload = serialize_override(Some(&overrides), "vicuna_v1.1").unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        let map = value.as_object().unwrap();

        assert_eq!(map.len(), 2);
        assert_eq!(map["top_p"], 0.8);
        assert_eq!(map["conv_template"], "vicuna_v1.1");
    }

    #[test]
    fn test_serialize_override_replaces_template_name() {
        let overrides = SessionConfig {
            conv_template: Some("stale-name".to_string()),
            ..Default::default()
        };

        let payload = serialize_override(Some(&overrides), "resolved").unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["conv_template"], "resolved");
    }

    #[test]
    fn test_serialize_override_none_is_empty() {
        assert_eq!(serialize_override(None, "vicuna_v1.1").unwrap(), "");
    }

    #[test]
    fn test_serialize_override_nested_fields() {
        let overrides = SessionConfig {
            conv_config: Some(ConversationConfig {
                stop_str: Some("\n".to_string()),
                offset: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        };

        let payload = serialize_override(Some(&overrides), "redpajama_chat").unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        let conv = value["conv_config"].as_object().unwrap();

        assert_eq!(conv.len(), 2);
        assert_eq!(conv["stop_str"], "\n");
        assert_eq!(conv["offset"], 0);
        assert!(conv.get("roles").is_none());
    }

    #[test]
    fn test_separator_style_document_ordinals() {
        let json = r#"{"separator_style": 1}"#;
        let conv: ConversationConfig = serde_json::from_str(json).unwrap();
        assert_eq!(conv.separator_style, Some(SeparatorStyle::PureLm));

        let out = serde_json::to_value(&conv).unwrap();
        assert_eq!(out["separator_style"], 1);
    }

    #[test]
    fn test_separator_style_rejects_unknown_ordinal() {
        let json = r#"{"separator_style": 7}"#;
        assert!(serde_json::from_str::<ConversationConfig>(json).is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_top_p() {
        let config = SessionConfig {
            top_p: Some(1.5),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.code(), "TOP_P_OUT_OF_RANGE");
    }

    #[test]
    fn test_validate_rejects_negative_temperature() {
        let config = SessionConfig {
            temperature: Some(-0.1),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.code(), "TEMPERATURE_INVALID");
    }

    #[test]
    fn test_validate_rejects_zero_repetition_penalty() {
        let config = SessionConfig {
            repetition_penalty: Some(0.0),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.code(), "REPETITION_PENALTY_INVALID");
    }

    #[test]
    fn test_validate_accepts_document_defaults() {
        assert!(base_config().validate().is_ok());
    }
}
