//! Entry-name pattern matching
//!
//! Patterns are case-insensitive, unanchored regular expressions tested
//! against each entry name, so `f.o` finds `Foo`. `find`/`ls` print every
//! match; `show`/`s` force the result down to one name, prompting the
//! operator when several qualify.

use regex::{Regex, RegexBuilder};

use crate::error::StoreError;

/// Outcome of resolving a pattern against the store listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    NoMatch,
    Unique(String),
    /// Candidates in lexicographic order, presented with 1-based ordinals
    Ambiguous(Vec<String>),
}

pub struct SearchMatcher {
    re: Regex,
}

impl SearchMatcher {
    pub fn new(pattern: &str) -> Result<Self, StoreError> {
        let re = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|err| StoreError::Pattern(err.to_string()))?;
        Ok(Self { re })
    }

    pub fn is_match(&self, name: &str) -> bool {
        self.re.is_match(name)
    }

    pub fn resolve(&self, names: &[String]) -> Resolution {
        let mut hits: Vec<String> = names
            .iter()
            .filter(|name| self.is_match(name))
            .cloned()
            .collect();
        hits.sort();
        match hits.len() {
            0 => Resolution::NoMatch,
            1 => Resolution::Unique(hits.remove(0)),
            _ => Resolution::Ambiguous(hits),
        }
    }
}
