//! Per-request selection context.

use std::collections::HashSet;
use std::time::Duration;

use crate::registry::BackendId;

/// Default number of candidates tried per logical request.
pub const DEFAULT_MAX_RETRIES: usize = 3;

/// State carried through one logical request.
#[derive(Debug, Clone)]
pub struct SelectionContext {
    /// Requested model.
    pub model: String,
    /// Backends already tried and rejected for this request.
    pub exclude: HashSet<BackendId>,
    /// Upper bound on candidates tried.
    pub max_retries: usize,
    /// Caller-supplied upstream timeout.
    pub timeout: Option<Duration>,
    /// Caller-supplied strategy name.
    pub strategy: Option<String>,
}

impl SelectionContext {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            exclude: HashSet::new(),
            max_retries: DEFAULT_MAX_RETRIES,
            timeout: None,
            strategy: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_strategy(mut self, strategy: Option<String>) -> Self {
        self.strategy = strategy;
        self
    }
}
