//! Engine configuration.
//!
//! Every field has a default so an empty JSON object (or no file at all) is a
//! valid configuration.

use crate::error::Result;
use rust_stemmers::Algorithm;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "DOCSEEK_CONFIG";

/// Weight of the title score when searching [`crate::FieldType::All`].
pub const DEFAULT_TITLE_WEIGHT: f32 = 1.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Snowball stemmer applied to content tokens.
    pub stemmer: StemmerLanguage,
    /// Run the language detector when documents are added or updated.
    pub detect_language: bool,
    /// External language detector; ignored unless `detect_language` is set.
    pub language_detector: Option<DetectorCommand>,
    pub title_weight: f32,
    /// Snippet window in tokens.
    pub snippet_window: usize,
    pub default_k: usize,
    pub layout: IndexLayout,
    pub index_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stemmer: StemmerLanguage::English,
            detect_language: false,
            language_detector: None,
            title_weight: DEFAULT_TITLE_WEIGHT,
            snippet_window: 20,
            default_k: 10,
            layout: IndexLayout::SingleFile,
            index_path: PathBuf::from("./index/index.json"),
        }
    }
}

impl EngineConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Loads `path` if given, otherwise the file named by `DOCSEEK_CONFIG`,
    /// otherwise the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        match std::env::var_os(CONFIG_ENV) {
            Some(p) => Self::from_file(PathBuf::from(p)),
            None => Ok(Self::default()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexLayout {
    /// One JSON document holding the whole index.
    SingleFile,
    /// A directory with one JSON file per index part.
    FileBased,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StemmerLanguage {
    Danish,
    Dutch,
    English,
    Finnish,
    French,
    German,
    Hungarian,
    Italian,
    Norwegian,
    Portuguese,
    Romanian,
    Russian,
    Spanish,
    Swedish,
}

impl From<StemmerLanguage> for Algorithm {
    fn from(lang: StemmerLanguage) -> Self {
        match lang {
            StemmerLanguage::Danish => Algorithm::Danish,
            StemmerLanguage::Dutch => Algorithm::Dutch,
            StemmerLanguage::English => Algorithm::English,
            StemmerLanguage::Finnish => Algorithm::Finnish,
            StemmerLanguage::French => Algorithm::French,
            StemmerLanguage::German => Algorithm::German,
            StemmerLanguage::Hungarian => Algorithm::Hungarian,
            StemmerLanguage::Italian => Algorithm::Italian,
            StemmerLanguage::Norwegian => Algorithm::Norwegian,
            StemmerLanguage::Portuguese => Algorithm::Portuguese,
            StemmerLanguage::Romanian => Algorithm::Romanian,
            StemmerLanguage::Russian => Algorithm::Russian,
            StemmerLanguage::Spanish => Algorithm::Spanish,
            StemmerLanguage::Swedish => Algorithm::Swedish,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let cfg: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.title_weight, 1.5);
    }

    #[test]
    fn partial_config_overrides_fields() {
        let cfg: EngineConfig = serde_json::from_str(
            r#"{"stemmer": "german", "layout": "file_based", "detect_language": true,
                "language_detector": {"program": "python3", "args": ["detect.py"]}}"#,
        )
        .unwrap();
        assert_eq!(cfg.stemmer, StemmerLanguage::German);
        assert_eq!(cfg.layout, IndexLayout::FileBased);
        assert_eq!(cfg.language_detector.unwrap().args, vec!["detect.py".to_string()]);
        assert_eq!(cfg.snippet_window, 20);
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docseek.json");
        std::fs::write(&path, r#"{"default_k": 3}"#).unwrap();
        let cfg = EngineConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.default_k, 3);
    }
}
