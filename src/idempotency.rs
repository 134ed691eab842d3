//! Idempotency keys for at-most-once side effects

use serde::{Deserialize, Serialize};

/// Name of an at-most-once flag in `OperationState`
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(pub Box<str>);

impl IdempotencyKey {
    /// Flag guarding the side effect of a named step
    pub fn for_step(step_name: &str) -> Self {
        Self(format!("step:{}:applied", step_name).into_boxed_str())
    }

    /// Set once the primary resource has been created
    pub fn resource_created() -> Self {
        Self("resource:created".into())
    }

    /// Set once the tag delta of an update has been applied
    pub fn tags_updated() -> Self {
        Self("tags:updated".into())
    }

    /// Set when creation fell back to system-only tags
    pub fn tagging_fallback() -> Self {
        Self("tags:fallback".into())
    }

    /// Set once the best-effort follow-up tagging has been attempted
    pub fn remaining_tags_attempted() -> Self {
        Self("tags:remaining-attempted".into())
    }

    /// Set while some requested tags are known to be missing
    pub fn tags_partially_applied() -> Self {
        Self("tags:partially-applied".into())
    }

    /// Get the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
