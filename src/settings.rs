use crate::streaming::{Framing, TransducerConfig};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// OpenAI-compatible chat completion endpoint used for segmentation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LlmProvider {
    pub id: String,
    pub label: String,
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// User prompt; `${sentence}` is replaced with the input sentence.
    #[serde(default = "default_prompt_template")]
    pub prompt_template: String,
}

impl Default for LlmProvider {
    fn default() -> Self {
        Self {
            id: "openai".to_string(),
            label: "OpenAI".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: default_api_key_env(),
            prompt_template: default_prompt_template(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AppSettings {
    #[serde(default = "default_dictionary_path")]
    pub dictionary_path: PathBuf,
    #[serde(default = "default_lookup_cache_capacity")]
    pub lookup_cache_capacity: usize,
    #[serde(default = "default_segmentation_cache_capacity")]
    pub segmentation_cache_capacity: usize,
    #[serde(default = "default_max_sentence_chars")]
    pub max_sentence_chars: usize,
    #[serde(default)]
    pub transducer: TransducerConfig,
    #[serde(default)]
    pub framing: Framing,
    #[serde(default)]
    pub provider: LlmProvider,
    #[serde(default = "default_debug_mode")]
    pub debug_mode: bool,
}

fn default_dictionary_path() -> PathBuf {
    PathBuf::from("dictionary.sqlite")
}

fn default_lookup_cache_capacity() -> usize {
    5000
}

fn default_segmentation_cache_capacity() -> usize {
    5000
}

fn default_max_sentence_chars() -> usize {
    crate::pronunciation::analyzer::DEFAULT_MAX_SENTENCE_CHARS
}

fn default_debug_mode() -> bool {
    false
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_prompt_template() -> String {
    concat!(
        "Segment the following Chinese sentence into words. ",
        "Reply with a JSON object of the form ",
        "{\"segments\": [{\"token\": \"...\", \"pronunciation\": \"...\", \"meaning\": \"...\"}]} ",
        "where pronunciation is tone-numbered pinyin (e.g. \"ni3 hao3\") and meaning is a short ",
        "English gloss in context. Keep the tokens in sentence order and cover every character.\n\n",
        "Sentence: ${sentence}"
    )
    .to_string()
}

pub const SETTINGS_FILE_NAME: &str = "hanzi_gloss_settings.json";

pub fn get_default_settings() -> AppSettings {
    AppSettings {
        dictionary_path: default_dictionary_path(),
        lookup_cache_capacity: default_lookup_cache_capacity(),
        segmentation_cache_capacity: default_segmentation_cache_capacity(),
        max_sentence_chars: default_max_sentence_chars(),
        transducer: TransducerConfig::default(),
        framing: Framing::default(),
        provider: LlmProvider::default(),
        debug_mode: default_debug_mode(),
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        get_default_settings()
    }
}

/// Loads settings from `path`, or from [`SETTINGS_FILE_NAME`] in the working
/// directory when no path is given.
///
/// An explicitly named file must exist. The implicit file may be absent, and
/// an unparseable implicit file falls back to defaults.
pub fn load_settings(path: Option<&Path>) -> Result<AppSettings> {
    let (path, explicit) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (PathBuf::from(SETTINGS_FILE_NAME), false),
    };

    if !path.exists() {
        if explicit {
            anyhow::bail!("Settings file not found: {}", path.display());
        }
        debug!("No settings file at {}, using defaults", path.display());
        return Ok(get_default_settings());
    }

    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read settings file {}", path.display()))?;

    match serde_json::from_str::<AppSettings>(&contents) {
        Ok(settings) => {
            info!("Loaded settings from {}", path.display());
            debug!("Settings: {:?}", settings);
            Ok(settings)
        }
        Err(e) if !explicit => {
            warn!(
                "Failed to parse settings file {}: {}. Using defaults",
                path.display(),
                e
            );
            Ok(get_default_settings())
        }
        Err(e) => {
            Err(e).with_context(|| format!("Failed to parse settings file {}", path.display()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = get_default_settings();
        assert_eq!(settings.dictionary_path, PathBuf::from("dictionary.sqlite"));
        assert_eq!(settings.lookup_cache_capacity, 5000);
        assert_eq!(settings.framing, Framing::EventStream);
        assert_eq!(settings.transducer.pronunciation_field, "pronunciation");
        assert!(settings.provider.prompt_template.contains("${sentence}"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"dictionary_path": "cedict.json", "framing": "raw", "transducer": {"array_field": "words"}}"#,
        )
        .unwrap();

        let settings = load_settings(Some(&path)).unwrap();
        assert_eq!(settings.dictionary_path, PathBuf::from("cedict.json"));
        assert_eq!(settings.framing, Framing::Raw);
        assert_eq!(settings.transducer.array_field, "words");
        assert_eq!(settings.transducer.token_field, "token");
        assert_eq!(settings.segmentation_cache_capacity, 5000);
        assert_eq!(settings.provider.api_key_env, "OPENAI_API_KEY");
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = TempDir::new().unwrap();
        assert!(load_settings(Some(&dir.path().join("missing.json"))).is_err());
    }

    #[test]
    fn test_explicit_invalid_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(load_settings(Some(&path)).is_err());
    }

    #[test]
    fn test_round_trip_through_json() {
        let settings = get_default_settings();
        let json = serde_json::to_string(&settings).unwrap();
        assert!(json.contains("\"event_stream\""));
        let parsed: AppSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, settings);
    }
}
