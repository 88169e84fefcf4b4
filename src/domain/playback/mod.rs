pub mod matcher;
pub mod snippet;

pub use matcher::{ClickOutcome, ClientMatcher, ElementId, Lookup, MappingFetchError};
