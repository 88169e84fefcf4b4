use crate::domain::canonical::rendered_key;
use crate::domain::mapping::Mapping;
use std::collections::HashSet;

#[derive(Debug, thiserror::Error)]
pub enum MappingFetchError {
    #[error("mapping request failed: {0}")]
    Request(String),
    #[error("mapping request returned status {0}")]
    Status(u16),
    #[error("mapping body is not a flat JSON object of strings: {0}")]
    Body(String),
}

/// Identity of a clickable page element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementId(pub String);

impl From<&str> for ElementId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Hit { key: String, url: String },
    Miss { key: String },
    /// Text has no letters or digits.
    Unmappable,
    /// The mapping could not be fetched; lookups are off for this page load.
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    Play { url: String },
    /// The element already shows a playback indicator; the click is ignored.
    AlreadyPlaying,
    NoAudio(Lookup),
}

/// Page-side lookup of clicked text against a fetched mapping, with one playback
/// indicator per element.
#[derive(Debug, Default)]
pub struct ClientMatcher {
    mapping: Option<Mapping>,
    playing: HashSet<ElementId>,
}

impl ClientMatcher {
    pub fn new(mapping: Mapping) -> Self {
        Self {
            mapping: Some(mapping),
            playing: HashSet::new(),
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    /// A failed fetch leaves the page working with lookups disabled.
    pub fn from_fetch(fetched: Result<Mapping, MappingFetchError>) -> Self {
        match fetched {
            Ok(mapping) => Self::new(mapping),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load TTS mapping, audio lookup disabled");
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.mapping.is_some()
    }

    pub fn resolve(&self, rendered_text: &str) -> Lookup {
        let Some(mapping) = &self.mapping else {
            return Lookup::Disabled;
        };

        let key = rendered_key(rendered_text);
        if key.is_empty() {
            return Lookup::Unmappable;
        }

        match mapping.get(&key) {
            Some(url) => Lookup::Hit {
                url: url.to_string(),
                key,
            },
            None => {
                tracing::warn!(key = %key, text = %rendered_text, "No TTS audio found for key");
                Lookup::Miss { key }
            }
        }
    }

    pub fn click(&mut self, element: &ElementId, rendered_text: &str) -> ClickOutcome {
        if self.playing.contains(element) {
            return ClickOutcome::AlreadyPlaying;
        }

        match self.resolve(rendered_text) {
            Lookup::Hit { url, .. } => {
                self.playing.insert(element.clone());
                ClickOutcome::Play { url }
            }
            other => ClickOutcome::NoAudio(other),
        }
    }

    /// Clears the indicator. Returns whether one was active.
    pub fn playback_ended(&mut self, element: &ElementId) -> bool {
        self.playing.remove(element)
    }

    /// Same transition as [`Self::playback_ended`]; an audio error must never leave the indicator on.
    pub fn playback_failed(&mut self, element: &ElementId, reason: &str) -> bool {
        tracing::warn!(element = %element.0, reason = %reason, "Audio playback failed");
        self.playing.remove(element)
    }

    pub fn is_playing(&self, element: &ElementId) -> bool {
        self.playing.contains(element)
    }
}
