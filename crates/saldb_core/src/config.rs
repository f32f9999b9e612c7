//! Store configuration.

use crate::index::TokenizerConfig;

/// When mutations against a non-latest revision are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImmutabilityCheck {
    /// Reject at the offending mutation call.
    #[default]
    Eager,
    /// Let mutations stage and reject the commit instead.
    OnCommit,
}

/// Configuration for opening a store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// When `ImmutableRevision` is raised.
    pub immutability: ImmutabilityCheck,

    /// Whether query leaves on unindexed fields fall back to a scan.
    pub allow_full_scans: bool,

    /// Token rules shared by every text index.
    pub tokenizer: TokenizerConfig,

    /// User recorded on commits whose session set none.
    pub default_user: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            immutability: ImmutabilityCheck::Eager,
            allow_full_scans: true,
            tokenizer: TokenizerConfig::default(),
            default_user: None,
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets when immutability violations are reported.
    #[must_use]
    pub const fn immutability(mut self, check: ImmutabilityCheck) -> Self {
        self.immutability = check;
        self
    }

    /// Sets whether unindexed query leaves may scan.
    #[must_use]
    pub const fn allow_full_scans(mut self, value: bool) -> Self {
        self.allow_full_scans = value;
        self
    }

    /// Sets the text index tokenizer.
    #[must_use]
    pub fn tokenizer(mut self, tokenizer: TokenizerConfig) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    /// Sets the default commit user.
    #[must_use]
    pub fn default_user(mut self, user: impl Into<String>) -> Self {
        self.default_user = Some(user.into());
        self
    }
}
