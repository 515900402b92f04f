//! Caller authentication subsystem.
//!
//! # Data Flow
//! ```text
//! Authorization: Bearer <token>  (parsed by http/request.rs)
//!     → CallerAuthenticator::validate(token, ValidationContext)
//!         → ValidationResult { valid, error, caller }
//!     → can_use_model / can_access_endpoint against CallerPermissions
//! ```
//!
//! # Design Decisions
//! - Permissions are typed lists; an empty list allows everything
//! - Rejections are logged as named security events at warn level

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

pub mod static_keys;

pub use static_keys::StaticKeyAuthenticator;

/// Request metadata used during validation.
#[derive(Debug, Clone, Default)]
pub struct ValidationContext {
    /// Request timestamp in unix seconds.
    pub timestamp: Option<i64>,
    pub nonce: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

impl ValidationContext {
    /// True if the timestamp is within `window_secs` of `now` (either side).
    pub fn is_timestamp_valid_at(&self, window_secs: u64, now: i64) -> bool {
        match self.timestamp {
            Some(ts) => now.abs_diff(ts) <= window_secs,
            None => false,
        }
    }

    pub fn is_timestamp_valid(&self, window_secs: u64) -> bool {
        self.is_timestamp_valid_at(window_secs, unix_now())
    }
}

pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Allow-lists attached to a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerPermissions {
    pub allowed_models: Vec<String>,
    pub allowed_endpoints: Vec<String>,
}

impl CallerPermissions {
    /// Exact membership; empty allows all.
    pub fn allows_model(&self, model: &str) -> bool {
        self.allowed_models.is_empty() || self.allowed_models.iter().any(|m| m == model)
    }

    /// `*`, exact, or trailing-`*` prefix match on the endpoint normalized
    /// to one leading slash; empty allows all.
    pub fn allows_endpoint(&self, endpoint: &str) -> bool {
        if self.allowed_endpoints.is_empty() {
            return true;
        }
        let endpoint = format!("/{}", endpoint.trim_start_matches('/'));
        self.allowed_endpoints.iter().any(|allowed| {
            if allowed == "*" || *allowed == endpoint {
                return true;
            }
            match allowed.strip_suffix('*') {
                Some(prefix) => endpoint.starts_with(prefix.trim_end_matches('*')),
                None => false,
            }
        })
    }
}

/// Authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub id: String,
    pub permissions: CallerPermissions,
}

/// Outcome of token validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub valid: bool,
    pub error: Option<String>,
    pub caller: Option<CallerIdentity>,
}

impl ValidationResult {
    pub fn ok(caller: CallerIdentity) -> Self {
        Self {
            valid: true,
            error: None,
            caller: Some(caller),
        }
    }

    pub fn denied(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
            caller: None,
        }
    }
}

/// Validates caller credentials and answers permission questions.
#[async_trait]
pub trait CallerAuthenticator: Send + Sync {
    async fn validate(&self, token: &str, ctx: &ValidationContext) -> ValidationResult;

    async fn can_use_model(&self, token: &str, model: &str) -> bool;

    async fn can_access_endpoint(&self, token: &str, endpoint: &str) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perms(models: &[&str], endpoints: &[&str]) -> CallerPermissions {
        CallerPermissions {
            allowed_models: models.iter().map(|s| s.to_string()).collect(),
            allowed_endpoints: endpoints.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_empty_lists_allow_all() {
        let p = perms(&[], &[]);
        assert!(p.allows_model("anything"));
        assert!(p.allows_endpoint("/whatever"));
    }

    #[test]
    fn test_model_is_exact() {
        let p = perms(&["gpt-4"], &[]);
        assert!(p.allows_model("gpt-4"));
        assert!(!p.allows_model("gpt-4-turbo"));
    }

    #[test]
    fn test_endpoint_matching() {
        let p = perms(&[], &["/chat/completions", "/embed*"]);
        assert!(p.allows_endpoint("chat/completions"));
        assert!(p.allows_endpoint("/embeddings"));
        assert!(!p.allows_endpoint("/completions"));

        assert!(perms(&[], &["*"]).allows_endpoint("/models"));
    }

    #[test]
    fn test_timestamp_window() {
        let ctx = ValidationContext { timestamp: Some(1_000), ..Default::default() };
        assert!(ctx.is_timestamp_valid_at(60, 1_060));
        assert!(ctx.is_timestamp_valid_at(60, 940));
        assert!(!ctx.is_timestamp_valid_at(60, 1_061));
        assert!(!ValidationContext::default().is_timestamp_valid_at(60, 1_000));
    }
}
