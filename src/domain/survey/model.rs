use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::error::PipelineError;

const MAX_SURVEY_ID_LEN: usize = 128;
const MAX_LANGUAGE_TAG_LEN: usize = 35;

/// Identifier of a survey. Scopes every output path, so only `[A-Za-z0-9_-]` is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SurveyId(String);

impl SurveyId {
    pub fn parse(raw: &str) -> Result<Self, PipelineError> {
        let trimmed = raw.trim();
        let valid = !trimmed.is_empty()
            && trimmed.len() <= MAX_SURVEY_ID_LEN
            && trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(PipelineError::InvalidSurveyId(raw.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SurveyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Language tag of an input column (`en`, `da`, `pt-BR`, ...). Used as a directory name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LanguageTag(String);

impl LanguageTag {
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let valid = !trimmed.is_empty()
            && trimmed.len() <= MAX_LANGUAGE_TAG_LEN
            && !trimmed.starts_with('-')
            && trimmed.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        valid.then(|| Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Suffix used for per-language environment variables (`pt-BR` -> `PT_BR`).
    pub fn env_suffix(&self) -> String {
        self.0.replace('-', "_").to_ascii_uppercase()
    }
}

impl TryFrom<String> for LanguageTag {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        LanguageTag::parse(&value).ok_or_else(|| format!("invalid language tag: {:?}", value))
    }
}

impl From<LanguageTag> for String {
    fn from(tag: LanguageTag) -> Self {
        tag.0
    }
}

impl std::fmt::Display for LanguageTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One non-empty input cell. Lives for a single pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextUnit {
    pub raw: String,
    pub language: LanguageTag,
    pub row: usize,
}

/// Input table: one object per row, one key per language column.
///
/// `{ "rows": [ { "en": "Hello", "da": "Hej" }, { "en": null, "da": "Farvel" } ] }`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranslationTable {
    pub rows: Vec<BTreeMap<String, Option<String>>>,
}

impl TranslationTable {
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, PipelineError> {
        serde_json::from_slice(bytes).map_err(|e| PipelineError::InputUnreadable(e.to_string()))
    }

    pub fn has_column(&self, language: &LanguageTag) -> bool {
        self.rows
            .iter()
            .any(|row| row.contains_key(language.as_str()))
    }

    /// Non-empty cells of a column in row order. `None` when the column is absent.
    pub fn column(&self, language: &LanguageTag) -> Option<Vec<TextUnit>> {
        if !self.has_column(language) {
            return None;
        }

        let units = self
            .rows
            .iter()
            .enumerate()
            .filter_map(|(row, cells)| {
                let raw = cells.get(language.as_str())?.as_ref()?;
                if raw.trim().is_empty() {
                    return None;
                }
                Some(TextUnit {
                    raw: raw.clone(),
                    language: language.clone(),
                    row,
                })
            })
            .collect();

        Some(units)
    }
}
