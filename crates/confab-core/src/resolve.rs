//! Model directory and backend library resolution
//!
//! A model identifier names a directory carrying the chat config
//! document; the backend library is a shared object compiled per model
//! and device. Both are searched across fixed candidate lists, and a
//! failed search reports every candidate it tried so the user can see
//! exactly what was expected where.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::SessionConfig;
use crate::device::DeviceType;
use crate::{CoreError, Result};

/// Config document expected inside every model directory
pub const CHAT_CONFIG_FILE: &str = "chat-config.json";

/// Known quantization scheme tokens in model identifiers, used to make
/// not-found suggestions concrete
pub const QUANTIZATION_SCHEMES: [&str; 12] = [
    "autogptq_llama_q4f16_0",
    "q0f16",
    "q0f32",
    "q3f16_0",
    "q3f16_1",
    "q4f16_0",
    "q4f16_1",
    "q4f16_ft",
    "q4f32_0",
    "q4f32_1",
    "q8f16_0",
    "q8f16_ft",
];

/// Candidate directories for a model identifier, in probe order
fn candidate_model_dirs(model: &str) -> Vec<PathBuf> {
    vec![
        PathBuf::from(model),
        PathBuf::from("dist/prebuilt").join(model),
        PathBuf::from("dist").join(model).join("params"),
        PathBuf::from("dist/prebuilt").join(format!("chat-{}", model)),
    ]
}

/// Library filename extensions to try on this platform, preferred first
fn library_extensions() -> &'static [&'static str] {
    if cfg!(target_os = "linux") {
        &["so"]
    } else if cfg!(target_os = "macos") {
        &["dylib", "so"]
    } else if cfg!(target_os = "windows") {
        &["dll"]
    } else {
        &["dylib", "so", "dll"]
    }
}

fn format_path_list(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| format!("  {}", path.display()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Locate the model directory for `model` and the config document inside
/// it.
///
/// Candidates are probed in order: the identifier taken as a path, then
/// the prebuilt and build-output layouts under `dist/`. The first
/// candidate containing [`CHAT_CONFIG_FILE`] wins. The failure message
/// distinguishes candidates that exist without the document from a
/// missing directory altogether.
pub fn find_model_dir(model: &str) -> Result<(PathBuf, PathBuf)> {
    let candidates = candidate_model_dirs(model);
    let mut existing_dirs = Vec::new();

    for dir in &candidates {
        if dir.is_dir() {
            let config_path = dir.join(CHAT_CONFIG_FILE);
            if config_path.is_file() {
                info!("Using model directory {}", dir.display());
                return Ok((dir.clone(), config_path));
            }
            existing_dirs.push(dir.clone());
        }
    }

    if existing_dirs.is_empty() {
        return Err(CoreError::model_not_found(
            "MODEL_DIR_NOT_FOUND",
            format!(
                "Cannot find model '{}'; no candidate directory exists:\n{}",
                model,
                format_path_list(&candidates)
            ),
            "Model directory resolution",
            format!(
                "Download or build the model first. Identifiers usually carry a \
                 quantization suffix, one of: {}",
                QUANTIZATION_SCHEMES.join(", ")
            ),
            candidates,
        ));
    }

    Err(CoreError::model_not_found(
        "MODEL_CONFIG_MISSING",
        format!(
            "Found directories for '{}' but none contains {}:\n{}\nAll searched paths:\n{}",
            model,
            CHAT_CONFIG_FILE,
            format_path_list(&existing_dirs),
            format_path_list(&candidates)
        ),
        "Model directory resolution",
        format!(
            "Place {} inside the model directory, or point at a directory that has one",
            CHAT_CONFIG_FILE
        ),
        candidates,
    ))
}

/// Locate the backend library for `model` on `device_type`.
///
/// An explicit path wins outright but must point at a file. Otherwise
/// the merged config's `model_lib` names the library stem; candidate
/// filenames are `{model_lib}-{device}.{ext}` with platform-ordered
/// extensions, probed as given, under the prebuilt lib dir, the build
/// output dir, the model directory and its parent.
pub fn find_backend_library(
    model: &str,
    model_dir: &Path,
    config: &SessionConfig,
    explicit_path: Option<&Path>,
    device_type: DeviceType,
) -> Result<PathBuf> {
    if let Some(path) = explicit_path {
        if path.is_file() {
            info!("Using backend library {}", path.display());
            return Ok(path.to_path_buf());
        }
        return Err(CoreError::library_not_found(
            "LIBRARY_PATH_NOT_FILE",
            format!("Backend library path {} is not a file", path.display()),
            "Backend library resolution",
            "Pass a path that points at the compiled model library",
            vec![path.to_path_buf()],
        ));
    }

    let model_lib = config.model_lib.as_deref().ok_or_else(|| {
        CoreError::configuration_field(
            "MODEL_LIB_UNSET",
            "Config document does not name a model library",
            format!("Resolving the backend library for '{}'", model),
            "Set model_lib in the chat config, or pass an explicit library path",
            "model_lib",
        )
    })?;

    let file_names: Vec<String> = library_extensions()
        .iter()
        .map(|ext| format!("{}-{}.{}", model_lib, device_type, ext))
        .collect();

    let search_dirs = [
        PathBuf::new(),
        PathBuf::from("dist/prebuilt/lib"),
        PathBuf::from("dist").join(model),
        model_dir.to_path_buf(),
        model_dir.join(".."),
    ];

    let mut searched = Vec::new();
    for file_name in &file_names {
        for dir in &search_dirs {
            let candidate = dir.join(file_name);
            if candidate.is_file() {
                info!("Using backend library {}", candidate.display());
                return Ok(candidate);
            }
            searched.push(candidate);
        }
    }

    Err(CoreError::library_not_found(
        "LIBRARY_NOT_FOUND",
        format!(
            "Cannot find the backend library for '{}' on {}; searched:\n{}",
            model,
            device_type,
            format_path_list(&searched)
        ),
        "Backend library resolution",
        format!(
            "Build the model library or pass its path explicitly; expected one of: {}",
            file_names.join(", ")
        ),
        searched,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_lists_all_candidates() {
        let err = find_model_dir("no-such-model-q4f16_1").unwrap_err();
        assert_eq!(err.code(), "MODEL_DIR_NOT_FOUND");

        let message = err.to_string();
        assert!(message.contains("no-such-model-q4f16_1"));
        assert!(message.contains("dist/prebuilt/no-such-model-q4f16_1"));
        assert!(message.contains("dist/no-such-model-q4f16_1/params"));
        assert!(message.contains("dist/prebuilt/chat-no-such-model-q4f16_1"));

        match err {
            CoreError::ModelNotFound { searched_paths, .. } => {
                assert_eq!(searched_paths.len(), 4);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_not_found_suggestion_names_quantization_schemes() {
        assert_eq!(QUANTIZATION_SCHEMES.len(), 12);
        assert!(QUANTIZATION_SCHEMES.contains(&"autogptq_llama_q4f16_0"));
        assert!(QUANTIZATION_SCHEMES.contains(&"q4f16_ft"));
        assert!(QUANTIZATION_SCHEMES.contains(&"q8f16_ft"));

        let message = find_model_dir("no-such-model-q0f16")
            .unwrap_err()
            .to_string();
        for scheme in QUANTIZATION_SCHEMES {
            assert!(message.contains(scheme), "suggestion omits {}", scheme);
        }
    }

    #[test]
    fn test_library_search_requires_model_lib() {
        let config = SessionConfig::default();
        let err = find_backend_library(
            "some-model",
            Path::new("some-model"),
            &config,
            None,
            DeviceType::Cpu,
        )
        .unwrap_err();
        assert_eq!(err.code(), "MODEL_LIB_UNSET");
    }

    #[test]
    fn test_library_candidates_are_device_suffixed() {
        let config = SessionConfig {
            model_lib: Some("vicuna-v1-7b-q4f32_0".to_string()),
            ..Default::default()
        };
        let err = find_backend_library(
            "vicuna-v1-7b",
            Path::new("vicuna-v1-7b"),
            &config,
            None,
            DeviceType::Vulkan,
        )
        .unwrap_err();
        assert_eq!(err.code(), "LIBRARY_NOT_FOUND");
        assert!(err.to_string().contains("vicuna-v1-7b-q4f32_0-vulkan"));
    }
}
