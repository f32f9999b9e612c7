//! Text index implementation.
//!
//! The `TextIndex` is an inverted index from normalized tokens to the
//! objects whose text contains them:
//! - Tokens split on whitespace, ASCII punctuation and configured separators
//! - Matching is case-insensitive unless the tokenizer says otherwise
//! - A multi-token query matches objects containing every token

use crate::error::{CoreError, CoreResult};
use crate::index::key::IndexKey;
use crate::index::postings::Postings;
use crate::index::spec::IndexSpec;
use crate::index::traits::{IdSet, Index};
use crate::object::ObjectId;
use crate::types::RevisionId;
use crate::value::Value;
use std::collections::HashMap;

/// Configuration for the text tokenizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizerConfig {
    /// Minimum token length to index, in characters.
    pub min_token_length: usize,
    /// Maximum token length to index, in characters.
    pub max_token_length: usize,
    /// Whether to perform case-insensitive matching.
    pub case_insensitive: bool,
    /// Additional characters to treat as separators.
    pub extra_separators: Vec<char>,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            min_token_length: 1,
            max_token_length: 256,
            case_insensitive: true,
            extra_separators: vec![],
        }
    }
}

impl TokenizerConfig {
    /// Creates a new tokenizer configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets minimum token length.
    #[must_use]
    pub fn min_length(mut self, len: usize) -> Self {
        self.min_token_length = len;
        self
    }

    /// Sets maximum token length.
    #[must_use]
    pub fn max_length(mut self, len: usize) -> Self {
        self.max_token_length = len;
        self
    }

    /// Makes matching case-sensitive.
    #[must_use]
    pub fn case_sensitive(mut self) -> Self {
        self.case_insensitive = false;
        self
    }

    /// Adds extra separator characters.
    #[must_use]
    pub fn with_separators(mut self, chars: &[char]) -> Self {
        self.extra_separators.extend_from_slice(chars);
        self
    }

    /// Splits `text` into distinct normalized tokens, in first-seen order.
    #[must_use]
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let mut tokens: Vec<String> = Vec::new();
        let parts = text.split(|c: char| {
            c.is_whitespace() || c.is_ascii_punctuation() || self.extra_separators.contains(&c)
        });
        for part in parts {
            let len = part.chars().count();
            if len == 0 || len < self.min_token_length || len > self.max_token_length {
                continue;
            }
            let token = if self.case_insensitive {
                part.to_lowercase()
            } else {
                part.to_string()
            };
            if !tokens.contains(&token) {
                tokens.push(token);
            }
        }
        tokens
    }
}

/// Inverted token index for `Contains` queries.
///
/// # Example
///
/// ```rust,ignore
/// let mut index = TextIndex::new(spec, TokenizerConfig::default());
/// for key in index.keys_for(&"Hello world, this is a test".into())? {
///     index.insert(&key, id, revision);
/// }
/// let found = index.search("HELLO test", revision)?;
/// ```
pub struct TextIndex {
    spec: IndexSpec,
    tokenizer: TokenizerConfig,
    inverted: HashMap<String, Postings>,
}

impl TextIndex {
    /// Creates an empty text index.
    pub fn new(spec: IndexSpec, tokenizer: TokenizerConfig) -> Self {
        Self {
            spec,
            tokenizer,
            inverted: HashMap::new(),
        }
    }

    /// Returns the tokenizer configuration.
    pub fn tokenizer(&self) -> &TokenizerConfig {
        &self.tokenizer
    }

    fn token<'k>(&self, key: &'k IndexKey) -> Option<&'k str> {
        match key {
            IndexKey::Text(token) => Some(token),
            _ => None,
        }
    }
}

impl Index for TextIndex {
    fn spec(&self) -> &IndexSpec {
        &self.spec
    }

    fn keys_for(&self, value: &Value) -> CoreResult<Vec<IndexKey>> {
        match value {
            Value::Text(text) => Ok(self
                .tokenizer
                .tokenize(text)
                .into_iter()
                .map(IndexKey::Text)
                .collect()),
            other => Err(CoreError::IndexTypeMismatch {
                index: self.spec.name().to_string(),
                found: other.describe(),
            }),
        }
    }

    fn insert(&mut self, key: &IndexKey, id: ObjectId, at: RevisionId) {
        if let Some(token) = self.token(key) {
            self.inverted
                .entry(token.to_string())
                .or_default()
                .open(id, at);
        }
    }

    fn remove(&mut self, key: &IndexKey, id: ObjectId, at: RevisionId) {
        if let Some(postings) = self.token(key).and_then(|t| self.inverted.get_mut(t)) {
            postings.close(id, at);
        }
    }

    /// Exact token lookup; the key is normalized like indexed text.
    fn lookup(&self, key: &IndexKey, at: RevisionId) -> IdSet {
        let Some(token) = self.token(key) else {
            return IdSet::new();
        };
        self.tokenizer
            .tokenize(token)
            .first()
            .and_then(|t| self.inverted.get(t))
            .map(|p| p.visible(at).collect())
            .unwrap_or_default()
    }

    fn search(&self, text: &str, at: RevisionId) -> CoreResult<IdSet> {
        let tokens = self.tokenizer.tokenize(text);
        let mut sets: Vec<IdSet> = Vec::with_capacity(tokens.len());
        for token in &tokens {
            match self.inverted.get(token) {
                Some(postings) => sets.push(postings.visible(at).collect()),
                None => return Ok(IdSet::new()),
            }
        }
        sets.sort_by_key(IdSet::len);
        let mut sets = sets.into_iter();
        let Some(mut result) = sets.next() else {
            return Ok(IdSet::new());
        };
        for set in sets {
            result.retain(|id| set.contains(id));
            if result.is_empty() {
                break;
            }
        }
        Ok(result)
    }

    fn undo(&mut self, at: RevisionId) {
        self.inverted.retain(|_, p| {
            p.undo(at);
            !p.is_empty()
        });
    }

    fn compact(&mut self, cutoff: RevisionId) {
        self.inverted.retain(|_, p| {
            p.compact(cutoff);
            !p.is_empty()
        });
    }

    fn clear(&mut self) {
        self.inverted.clear();
    }

    fn len(&self) -> usize {
        self.inverted.len()
    }
}
