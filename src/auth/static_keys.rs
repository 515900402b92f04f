//! Config-backed caller authentication.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;

use crate::auth::{CallerAuthenticator, CallerIdentity, CallerPermissions, ValidationContext, ValidationResult};
use crate::config::schema::CallerConfig;
use crate::config::validation::MIN_TOKEN_LEN;

/// Authenticates callers against the `[[callers]]` table.
///
/// The table is swapped atomically on config reload.
pub struct StaticKeyAuthenticator {
    callers: ArcSwap<HashMap<String, CallerConfig>>,
}

impl StaticKeyAuthenticator {
    pub fn new(callers: &[CallerConfig]) -> Self {
        Self {
            callers: ArcSwap::from_pointee(index(callers)),
        }
    }

    /// Replace the caller table.
    pub fn reload(&self, callers: &[CallerConfig]) {
        self.callers.store(Arc::new(index(callers)));
        tracing::info!(callers = callers.len(), "Caller table reloaded");
    }

    fn enabled_caller(&self, token: &str) -> Option<CallerConfig> {
        self.callers.load().get(token).filter(|c| c.enabled).cloned()
    }
}

fn index(callers: &[CallerConfig]) -> HashMap<String, CallerConfig> {
    callers.iter().map(|c| (c.token.clone(), c.clone())).collect()
}

fn identity(caller: &CallerConfig) -> CallerIdentity {
    CallerIdentity {
        id: caller.id.clone(),
        permissions: CallerPermissions {
            allowed_models: caller.allowed_models.clone(),
            allowed_endpoints: caller.allowed_endpoints.clone(),
        },
    }
}

fn token_prefix(token: &str) -> &str {
    match token.char_indices().nth(MIN_TOKEN_LEN) {
        Some((i, _)) => &token[..i],
        None => token,
    }
}

#[async_trait]
impl CallerAuthenticator for StaticKeyAuthenticator {
    async fn validate(&self, token: &str, ctx: &ValidationContext) -> ValidationResult {
        let ip = ctx.ip_address.as_deref().unwrap_or("-");

        if token.is_empty() {
            tracing::warn!(event = "empty_token", ip, "Security event");
            return ValidationResult::denied("Token cannot be empty");
        }

        if token.len() < MIN_TOKEN_LEN {
            tracing::warn!(event = "token_too_short", ip, "Security event");
            return ValidationResult::denied("Invalid token format");
        }

        let Some(caller) = self.callers.load().get(token).cloned() else {
            tracing::warn!(event = "invalid_token", token_prefix = token_prefix(token), ip, "Security event");
            return ValidationResult::denied("Invalid token");
        };

        if !caller.enabled {
            tracing::warn!(event = "disabled_token", caller_id = %caller.id, ip, "Security event");
            return ValidationResult::denied("Token is disabled");
        }

        if caller.sign_timeout_secs > 0 {
            if ctx.timestamp.is_none() {
                tracing::warn!(event = "missing_timestamp", caller_id = %caller.id, ip, "Security event");
                return ValidationResult::denied("Timestamp required for this token");
            }
            if !ctx.is_timestamp_valid(caller.sign_timeout_secs) {
                tracing::warn!(
                    event = "timestamp_invalid",
                    caller_id = %caller.id,
                    timestamp = ?ctx.timestamp,
                    timeout = caller.sign_timeout_secs,
                    ip,
                    "Security event"
                );
                return ValidationResult::denied("Request timestamp is invalid or expired");
            }
        }

        ValidationResult::ok(identity(&caller))
    }

    async fn can_use_model(&self, token: &str, model: &str) -> bool {
        self.enabled_caller(token)
            .map_or(false, |c| identity(&c).permissions.allows_model(model))
    }

    async fn can_access_endpoint(&self, token: &str, endpoint: &str) -> bool {
        let Some(caller) = self.enabled_caller(token) else {
            return false;
        };
        let allowed = identity(&caller).permissions.allows_endpoint(endpoint);
        if !allowed {
            tracing::warn!(
                event = "endpoint_denied",
                caller_id = %caller.id,
                endpoint,
                allowed_endpoints = ?caller.allowed_endpoints,
                "Security event"
            );
        }
        allowed
    }
}
