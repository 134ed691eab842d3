//! Operation state carried between invocations

use crate::{IdempotencyKey, StateCodecError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which host-facing operation is running
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Create,
    Read,
    Update,
    Delete,
    List,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::List => "list",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consecutive-success counters keyed by probe name
#[derive(
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    rkyv::Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
)]
pub struct ProbeState {
    counters: BTreeMap<String, u32>,
}

impl ProbeState {
    /// Current consecutive-success count for `name`
    pub fn count(&self, name: &str) -> u32 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    /// Increment the counter for `name` and return the new value
    pub fn increment(&mut self, name: &str) -> u32 {
        let counter = self.counters.entry(name.to_owned()).or_insert(0);
        *counter = counter.saturating_add(1);
        *counter
    }

    /// Drop the counter for `name`
    pub fn reset(&mut self, name: &str) {
        self.counters.remove(name);
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

/// Host-persisted state of one in-flight operation.
///
/// Created empty on the first invocation, mutated by every step, handed
/// back to the host inside `Outcome::InProgress` and dropped on any
/// terminal outcome. Steps with at-most-once side effects record their
/// completion here so that re-running the whole chain on the next
/// invocation skips them.
#[derive(
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    rkyv::Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
)]
pub struct OperationState {
    #[serde(default)]
    flags: BTreeMap<String, bool>,
    #[serde(default)]
    probes: ProbeState,
    #[serde(default)]
    waited_seconds: u64,
    #[serde(default)]
    identifiers: BTreeMap<String, String>,
    #[serde(default)]
    invocations: u32,
}

impl OperationState {
    /// Fresh state for the first invocation of an operation
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick up the host-supplied state, or start fresh, and count the invocation
    pub fn resume(previous: Option<OperationState>) -> Self {
        let mut state = previous.unwrap_or_default();
        state.invocations = state.invocations.saturating_add(1);
        state
    }

    /// Number of invocations seen so far, including the current one
    pub fn invocations(&self) -> u32 {
        self.invocations
    }

    /// Whether the side effect behind `key` has already been applied
    pub fn is_applied(&self, key: &IdempotencyKey) -> bool {
        self.flags.get(key.as_str()).copied().unwrap_or(false)
    }

    /// Record that the side effect behind `key` has been applied
    pub fn mark_applied(&mut self, key: &IdempotencyKey) {
        self.flags.insert(key.as_str().to_owned(), true);
    }

    pub fn clear(&mut self, key: &IdempotencyKey) {
        self.flags.remove(key.as_str());
    }

    pub fn probes(&self) -> &ProbeState {
        &self.probes
    }

    pub fn probes_mut(&mut self) -> &mut ProbeState {
        &mut self.probes
    }

    /// Seconds already spent in artificial waits
    pub fn waited_seconds(&self) -> u64 {
        self.waited_seconds
    }

    /// Advance the wait timer; it never moves backwards
    pub fn advance_wait(&mut self, seconds: u64) {
        self.waited_seconds = self.waited_seconds.saturating_add(seconds);
    }

    /// Identity field discovered mid-workflow (e.g. an ARN)
    pub fn identifier(&self, name: &str) -> Option<&str> {
        self.identifiers.get(name).map(String::as_str)
    }

    pub fn set_identifier(&mut self, name: &str, value: impl Into<String>) {
        self.identifiers.insert(name.to_owned(), value.into());
    }

    /// Encode for hosts that persist binary blobs
    pub fn to_bytes(&self) -> Result<Vec<u8>, StateCodecError> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|bytes| bytes.to_vec())
            .map_err(|e| StateCodecError::Encode(e.to_string().into()))
    }

    /// Decode a blob produced by [`OperationState::to_bytes`]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StateCodecError> {
        // Archived data must be aligned; host buffers usually are not.
        let mut aligned = rkyv::util::AlignedVec::<16>::with_capacity(bytes.len());
        aligned.extend_from_slice(bytes);
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(&aligned)
            .map_err(|e| StateCodecError::Decode(e.to_string().into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resume_counts_invocations() {
        let first = OperationState::resume(None);
        assert_eq!(first.invocations(), 1);

        let second = OperationState::resume(Some(first));
        assert_eq!(second.invocations(), 2);
    }

    #[test]
    fn test_flags_and_identifiers() {
        let key = IdempotencyKey::for_step("apply-parameters");
        let mut state = OperationState::new();
        assert!(!state.is_applied(&key));

        state.mark_applied(&key);
        state.set_identifier("arn", "arn:aws:rds:us-east-1:123:db:orders");
        assert!(state.is_applied(&key));
        assert_eq!(
            state.identifier("arn"),
            Some("arn:aws:rds:us-east-1:123:db:orders")
        );

        state.clear(&key);
        assert!(!state.is_applied(&key));
    }

    #[test]
    fn test_binary_state_survives_host_boundary() {
        let mut state = OperationState::resume(None);
        state.mark_applied(&IdempotencyKey::tags_updated());
        state.probes_mut().increment("available");
        state.advance_wait(30);
        state.set_identifier("resource-id", "db-123");

        let bytes = state.to_bytes().unwrap();
        let restored = OperationState::from_bytes(&bytes).unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn test_json_state_tolerates_missing_fields() {
        let state: OperationState = serde_json::from_str(r#"{"waited_seconds": 20}"#).unwrap();
        assert_eq!(state.waited_seconds(), 20);
        assert!(state.probes().is_empty());
    }

    #[test]
    fn test_garbage_bytes_rejected() {
        assert!(OperationState::from_bytes(&[1, 2, 3]).is_err());
    }
}
