use crate::domain::canonical::CanonicalKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// File name of a published mapping inside a survey directory.
pub const MAPPING_FILE_NAME: &str = "tts_mapping.json";

/// Canonical key -> public audio URL. Keys are unique; a later insert replaces the earlier URL.
///
/// Serialized as a flat JSON object. Keys are kept sorted so identical runs write identical files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mapping {
    entries: BTreeMap<String, String>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite; returns the URL that was replaced.
    pub fn insert(&mut self, key: &CanonicalKey, url: impl Into<String>) -> Option<String> {
        self.entries.insert(key.as_str().to_string(), url.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pretty JSON, non-ASCII kept verbatim.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
