//! Backend identity and descriptors.
//!
//! # Responsibilities
//! - Represent a single pooled backend (identity, provider, URL, credential, models)
//! - Derive a stable identifier that survives pool refreshes
//! - Answer "does this backend serve model X"

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::Serialize;

use crate::registry::provider::BackendHandle;

/// Stable backend identifier.
///
/// Hash of (provider, backend name, base URL). Health and stats records
/// are keyed by it, so they carry over when the pool is rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BackendId(u64);

impl BackendId {
    /// Derive the id for a backend.
    pub fn derive(provider: &str, name: &str, base_url: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        provider.hash(&mut hasher);
        name.hash(&mut hasher);
        base_url.hash(&mut hasher);
        Self(hasher.finish())
    }

    /// Raw value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b-{:016x}", self.0)
    }
}

impl Serialize for BackendId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Immutable description of a pooled backend.
#[derive(Clone, Serialize)]
pub struct BackendDescriptor {
    pub id: BackendId,
    pub provider: String,
    pub name: String,
    pub base_url: String,
    #[serde(skip)]
    pub credential: String,
    /// Advertised models. Empty accepts any model.
    pub models: Vec<String>,
}

impl BackendDescriptor {
    /// True if the backend advertises no models, or one of its models is a
    /// prefix of `model` or has `model` as a prefix (case-sensitive).
    pub fn supports_model(&self, model: &str) -> bool {
        self.models.is_empty()
            || self
                .models
                .iter()
                .any(|m| model.starts_with(m.as_str()) || m.starts_with(model))
    }
}

impl fmt::Debug for BackendDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendDescriptor")
            .field("id", &self.id)
            .field("provider", &self.provider)
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("credential", &"***")
            .field("models", &self.models)
            .finish()
    }
}

/// A pool member: descriptor plus the handle used for probes.
pub struct PoolEntry {
    pub descriptor: BackendDescriptor,
    pub handle: Arc<dyn BackendHandle>,
}

impl PoolEntry {
    pub fn id(&self) -> BackendId {
        self.descriptor.id
    }
}

impl fmt::Debug for PoolEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.descriptor.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(models: &[&str]) -> BackendDescriptor {
        BackendDescriptor {
            id: BackendId::derive("p", "b", "https://api.example.com"),
            provider: "p".into(),
            name: "b".into(),
            base_url: "https://api.example.com".into(),
            credential: "k".into(),
            models: models.iter().map(|m| m.to_string()).collect(),
        }
    }

    #[test]
    fn test_prefix_match_both_directions() {
        let d = descriptor(&["gpt-4"]);
        assert!(d.supports_model("gpt-4"));
        assert!(d.supports_model("gpt-4-turbo"));
        assert!(d.supports_model("gpt"));
        assert!(!d.supports_model("gpt-3.5-turbo"));
        assert!(!d.supports_model("GPT-4"));
    }

    #[test]
    fn test_empty_models_accept_anything() {
        let d = descriptor(&[]);
        assert!(d.supports_model("claude-3-opus"));
        assert!(d.supports_model(""));
    }

    #[test]
    fn test_id_is_stable_and_distinct() {
        let a = BackendId::derive("p", "b", "https://x");
        assert_eq!(a, BackendId::derive("p", "b", "https://x"));
        assert_ne!(a, BackendId::derive("p", "b", "https://y"));
        assert!(a.to_string().starts_with("b-"));
        assert_eq!(a.to_string().len(), 18);
    }

    #[test]
    fn test_debug_hides_credential() {
        let d = descriptor(&[]);
        assert!(!format!("{:?}", d).contains("\"k\""));
    }
}
