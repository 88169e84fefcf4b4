//! Canonical keys and synthesis text.
//!
//! Two functions derive everything the pipeline and the page agree on:
//!
//! - [`synthesis_text`] cleans a spreadsheet cell into readable text for a synthesis backend.
//! - [`canonical_key`] reduces a cell to lowercase letters and decimal digits. The page computes
//!   the same key from rendered DOM text with [`rendered_key`], so both sides must stay in lockstep
//!   with [`KEY_EXCLUDED_PATTERN`] and the golden vectors in `tests/fixtures/canonical_keys.json`.

use html5ever::{
    local_name, namespace_url, ns, parse_fragment, tendril::TendrilSink, ParseOpts, QualName,
};
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

/// Characters removed from a key. The browser snippet embeds this exact pattern with the `u` flag.
pub const KEY_EXCLUDED_PATTERN: &str = r"[^\p{L}\p{Nd}]";

/// Elements whose text never shows up in `innerText`.
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "template", "noscript"];

/// Elements that start a new line or cell in rendered text. They become a space so adjacent
/// words stay apart in synthesis text; keys drop the space anyway.
const BREAKING_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "caption", "dd", "div", "dl", "dt",
    "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6",
    "header", "hr", "li", "main", "nav", "ol", "p", "pre", "section", "table", "td", "th", "tr",
    "ul",
];

static KEY_EXCLUDED: Lazy<Regex> =
    Lazy::new(|| Regex::new(KEY_EXCLUDED_PATTERN).expect("key pattern is valid"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// A non-empty canonical key. Empty keys are unmappable and never reach a [`crate::domain::mapping::Mapping`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    /// Derive the key of a raw cell, `None` when nothing letter-like survives.
    pub fn from_raw(raw: &str) -> Option<Self> {
        Self::from_key(canonical_key(raw))
    }

    fn from_key(key: String) -> Option<Self> {
        if key.is_empty() {
            None
        } else {
            Some(Self(key))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Text handed to a synthesis backend: markup stripped, NBSP replaced, whitespace collapsed, NFC.
pub fn synthesis_text(raw: &str) -> String {
    let stripped = strip_markup(&nfc(raw));
    let spaced = stripped.replace('\u{00a0}', " ");
    let collapsed = WHITESPACE.replace_all(&spaced, " ");
    nfc(collapsed.trim())
}

/// Canonical key of a raw cell, possibly containing markup. Total: every string maps to one key,
/// the empty string included.
pub fn canonical_key(raw: &str) -> String {
    rendered_key(&strip_markup(&nfc(raw)))
}

/// Canonical key of text that is already rendered. No markup parsing happens here, which is what
/// the page does with `innerText`.
pub fn rendered_key(text: &str) -> String {
    // Default (root locale) lowercase mapping; matches `String.prototype.toLowerCase`.
    let lowered = nfc(text).to_lowercase();
    let kept = KEY_EXCLUDED.replace_all(&lowered, "");
    // Removing separators can bring composable letters together (Hangul jamo).
    nfc(&kept)
}

/// Text nodes of an HTML fragment in document order, entities decoded, the way the page's
/// `innerText` sees them: attribute text (`alt`, `title`) and script or style bodies are left out,
/// and `<sup>2</sup>` stays the digit `2`. Text without markup passes through untouched.
pub fn strip_markup(raw: &str) -> String {
    if !raw.contains('<') && !raw.contains('&') {
        return raw.to_string();
    }

    let body = QualName::new(None, ns!(html), local_name!("body"));
    let dom = parse_fragment(RcDom::default(), ParseOpts::default(), body, Vec::new()).one(raw);

    let mut text = String::with_capacity(raw.len());
    // Explicit stack so deeply nested markup cannot overflow the call stack.
    let mut stack = vec![Visit::Enter(dom.document.clone())];
    while let Some(visit) = stack.pop() {
        let node = match visit {
            Visit::Enter(node) => node,
            Visit::Break => {
                text.push(' ');
                continue;
            }
        };
        match &node.data {
            NodeData::Text { contents } => text.push_str(&contents.borrow()),
            NodeData::Element { name, .. } => {
                let tag: &str = &name.local;
                if HIDDEN_ELEMENTS.contains(&tag) {
                    continue;
                }
                if BREAKING_ELEMENTS.contains(&tag) {
                    text.push(' ');
                    stack.push(Visit::Break);
                }
                push_children(&mut stack, &node);
            }
            NodeData::Document => push_children(&mut stack, &node),
            _ => {}
        }
    }
    text
}

enum Visit {
    Enter(Handle),
    Break,
}

fn push_children(stack: &mut Vec<Visit>, node: &Handle) {
    stack.extend(node.children.borrow().iter().rev().cloned().map(Visit::Enter));
}

fn nfc(text: &str) -> String {
    text.nfc().collect()
}
