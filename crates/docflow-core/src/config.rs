//! Engine configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Tokens shorter than this (in chars) are dropped at index and query time.
    pub text_min_token_len: usize,

    /// Drop a fixed English stop-word list at index and query time.
    pub text_stop_words: bool,

    /// When set, a text query with phrases only matches documents containing
    /// every phrase. Otherwise a document matches if it contains any bare term
    /// or satisfies every phrase.
    pub text_phrases_required: bool,

    /// Output field used by `find()` lowering for a `$meta` sort without a
    /// projection naming the score.
    pub text_score_field: String,

    /// Advisory cap on documents buffered by one blocking stage (`$group`,
    /// `$sort`, `$count`). `None` imposes no cap.
    pub max_stage_docs: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            text_min_token_len: 1,
            text_stop_words: false,
            text_phrases_required: false,
            text_score_field: "score".to_string(),
            max_stage_docs: None,
        }
    }
}

impl EngineConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `DOCFLOW_TEXT_MIN_TOKEN_LEN`: minimum token length
    /// - `DOCFLOW_TEXT_STOP_WORDS`: `1`/`true` to drop English stop words
    /// - `DOCFLOW_TEXT_PHRASES_REQUIRED`: `1`/`true` to require every phrase
    /// - `DOCFLOW_TEXT_SCORE_FIELD`: score field name for `find()` lowering
    /// - `DOCFLOW_MAX_STAGE_DOCS`: per-stage buffering cap
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("DOCFLOW_TEXT_MIN_TOKEN_LEN") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.text_min_token_len = v;
            }
        }

        if let Ok(s) = std::env::var("DOCFLOW_TEXT_STOP_WORDS") {
            if let Some(v) = parse_flag(&s) {
                cfg.text_stop_words = v;
            }
        }

        if let Ok(s) = std::env::var("DOCFLOW_TEXT_PHRASES_REQUIRED") {
            if let Some(v) = parse_flag(&s) {
                cfg.text_phrases_required = v;
            }
        }

        if let Ok(s) = std::env::var("DOCFLOW_TEXT_SCORE_FIELD") {
            if !s.trim().is_empty() {
                cfg.text_score_field = s.trim().to_string();
            }
        }

        if let Ok(s) = std::env::var("DOCFLOW_MAX_STAGE_DOCS") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.max_stage_docs = Some(v);
            }
        }

        cfg
    }

    pub fn validate(&self) -> Result<()> {
        if self.text_min_token_len == 0 {
            return Err(Error::Config("text_min_token_len must be at least 1".into()));
        }
        if self.text_score_field.is_empty() || self.text_score_field.starts_with('$') {
            return Err(Error::Config(format!(
                "text_score_field '{}' is not a valid field name",
                self.text_score_field
            )));
        }
        if self.max_stage_docs == Some(0) {
            return Err(Error::Config("max_stage_docs must be positive".into()));
        }
        Ok(())
    }
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_bad_values() {
        let cfg = EngineConfig {
            text_min_token_len: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = EngineConfig {
            text_score_field: "$score".into(),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn flags_accept_common_spellings() {
        assert_eq!(parse_flag("ON"), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: EngineConfig = serde_json::from_str(r#"{"text_stop_words": true}"#).unwrap();
        assert!(cfg.text_stop_words);
        assert_eq!(cfg.text_min_token_len, 1);
    }
}
