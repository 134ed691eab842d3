//! Layered tag reconciliation
//!
//! Tags come in three ownership tiers: `system` (platform-owned), `stack`
//! (group-owned) and `resource` (the caller's own tags on the object).
//! When a remote call only takes one tag map the tiers are flattened with
//! precedence `resource > stack > system`.

use crate::{
    rules::ACCESS_DENIED_CODES, Disposition, HandlerErrorCode, IdempotencyKey, Matcher,
    OperationState, Progress, RemoteError, RuleSet, Sequencer,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Flat key/value tag map as sent to the remote API
pub type TagMap = BTreeMap<String, String>;

/// Substrings of an authorization failure message that point at the tagging
/// part of a create call rather than the create itself.
pub const TAGGING_ACTION_MARKERS: &[&str] = &["AddTagsToResource", "TagResource", "CreateTags"];

/// Tags split by ownership tier
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSet {
    #[serde(default)]
    pub system: TagMap,
    #[serde(default)]
    pub stack: TagMap,
    #[serde(default)]
    pub resource: TagMap,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system(mut self, key: &str, value: &str) -> Self {
        self.system.insert(key.to_owned(), value.to_owned());
        self
    }

    pub fn with_stack(mut self, key: &str, value: &str) -> Self {
        self.stack.insert(key.to_owned(), value.to_owned());
        self
    }

    pub fn with_resource(mut self, key: &str, value: &str) -> Self {
        self.resource.insert(key.to_owned(), value.to_owned());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.system.is_empty() && self.stack.is_empty() && self.resource.is_empty()
    }

    /// Merge tiers into one map, later tiers winning on key collision
    pub fn flatten(&self) -> TagMap {
        flatten(self)
    }

    /// Only the platform-owned tier
    pub fn system_only(&self) -> TagSet {
        TagSet {
            system: self.system.clone(),
            ..TagSet::default()
        }
    }

    /// Stack and resource tiers, without the platform-owned tier
    pub fn without_system(&self) -> TagSet {
        TagSet {
            system: TagMap::new(),
            ..self.clone()
        }
    }
}

/// Tags to add and remove, per tier
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagDelta {
    pub to_add: TagSet,
    pub to_remove: TagSet,
}

impl TagDelta {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    /// Whether the caller's own tags take part in this change
    pub fn involves_resource_tags(&self) -> bool {
        !self.to_add.resource.is_empty() || !self.to_remove.resource.is_empty()
    }
}

/// Per-tier set difference on key and value; a changed value is a removal plus an addition
pub fn diff(previous: &TagSet, desired: &TagSet) -> TagDelta {
    TagDelta {
        to_add: TagSet {
            system: minus(&desired.system, &previous.system),
            stack: minus(&desired.stack, &previous.stack),
            resource: minus(&desired.resource, &previous.resource),
        },
        to_remove: TagSet {
            system: minus(&previous.system, &desired.system),
            stack: minus(&previous.stack, &desired.stack),
            resource: minus(&previous.resource, &desired.resource),
        },
    }
}

fn minus(left: &TagMap, right: &TagMap) -> TagMap {
    left.iter()
        .filter(|(key, value)| right.get(*key) != Some(*value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Merge tiers with precedence `resource > stack > system`
pub fn flatten(tags: &TagSet) -> TagMap {
    let mut flat = tags.system.clone();
    flat.extend(tags.stack.iter().map(|(k, v)| (k.clone(), v.clone())));
    flat.extend(tags.resource.iter().map(|(k, v)| (k.clone(), v.clone())));
    flat
}

/// Remote tagging calls for one resource type
pub trait TaggingClient {
    /// Add or overwrite `tags` on the resource
    fn add_tags(&self, resource_id: &str, tags: &TagMap) -> Result<(), RemoteError>;
    /// Remove the given keys; absent keys are not an error
    fn remove_tags(&self, resource_id: &str, keys: &[String]) -> Result<(), RemoteError>;
}

/// Authorization rules for a tag update.
///
/// Platform-managed tags failing is reported as an unauthorized tagging
/// operation; the caller's own tags failing is plain access denied.
pub fn update_tags_access_denied_rules(resource_tags_involved: bool) -> RuleSet {
    let code = if resource_tags_involved {
        HandlerErrorCode::AccessDenied
    } else {
        HandlerErrorCode::UnauthorizedTaggingOperation
    };
    RuleSet::new().on_codes(ACCESS_DENIED_CODES, Disposition::FailWith(code))
}

/// Whether a create failure is an authorization error on the tagging part of the call.
///
/// Relies on the service naming the tagging action in the message.
pub fn is_tagging_authorization_failure(error: &RemoteError) -> bool {
    Matcher::codes(ACCESS_DENIED_CODES).matches(error)
        && TAGGING_ACTION_MARKERS
            .iter()
            .any(|marker| error.message.contains(marker))
}

/// Apply the tag delta between `previous` and `desired` to `resource_id`.
///
/// The calls are computed on the flattened maps: keys missing from the
/// desired map are removed first, then every key whose effective value
/// changed is written. The per-tier delta only picks the access-denied
/// rules; errors go through those, then `rules`.
#[allow(clippy::too_many_arguments)]
pub fn update_tags<R, C>(
    seq: &Sequencer,
    resource: R,
    state: OperationState,
    client: &C,
    resource_id: &str,
    previous: &TagSet,
    desired: &TagSet,
    rules: &RuleSet,
) -> Progress<R>
where
    C: TaggingClient + ?Sized,
{
    let done_key = IdempotencyKey::tags_updated();
    if state.is_applied(&done_key) {
        seq.note_skipped("update-tags", &done_key);
        return Progress::progress(resource, state);
    }

    let delta = diff(previous, desired);
    if delta.is_empty() {
        return Progress::progress(resource, state);
    }

    let rules =
        update_tags_access_denied_rules(delta.involves_resource_tags()).or_else(rules.clone());
    let previous_flat = previous.flatten();
    let desired_flat = desired.flatten();
    let remove_keys: Vec<String> = previous_flat
        .keys()
        .filter(|key| !desired_flat.contains_key(*key))
        .cloned()
        .collect();
    let add = minus(&desired_flat, &previous_flat);

    tracing::debug!(
        resource_id,
        remove = remove_keys.len(),
        add = add.len(),
        resource_tags = delta.involves_resource_tags(),
        "Reconciling tags"
    );

    Progress::progress(resource, state)
        .then(|r, s| {
            if remove_keys.is_empty() {
                return Progress::progress(r, s);
            }
            seq.initiate("untag-resource", r, s)
                .idempotent(IdempotencyKey::for_step("untag-resource"))
                .translate(|_| remove_keys)
                .call(|keys| client.remove_tags(resource_id, keys))
                .handle_error(rules.clone())
                .progress()
        })
        .then(|r, s| {
            if add.is_empty() {
                return Progress::progress(r, s);
            }
            seq.initiate("tag-resource", r, s)
                .idempotent(IdempotencyKey::for_step("tag-resource"))
                .translate(|_| add)
                .call(|tags| client.add_tags(resource_id, tags))
                .handle_error(rules.clone())
                .progress()
        })
        .then(|r, mut s| {
            s.mark_applied(&done_key);
            Progress::progress(r, s)
        })
}

/// Create with all tags, falling back to system tags only when tagging is not authorized.
///
/// `create` receives the flattened tags to send and records discovered
/// identity on the resource and state. The fallback only applies when the
/// caller has no resource-tier tags; the remaining tags are then left for
/// [`apply_remaining_tags`].
pub fn create_with_tagging_fallback<R, F>(
    seq: &Sequencer,
    mut resource: R,
    mut state: OperationState,
    tags: &TagSet,
    rules: &RuleSet,
    mut create: F,
) -> Progress<R>
where
    F: FnMut(&mut R, &mut OperationState, &TagMap) -> Result<(), RemoteError>,
{
    const STEP: &str = "create-resource";
    let created = IdempotencyKey::resource_created();

    seq.observer().on_step_started(seq.operation(), STEP);
    if state.is_applied(&created) {
        seq.note_skipped(STEP, &created);
        return Progress::progress(resource, state);
    }

    seq.note_remote_call(STEP);
    let error = match create(&mut resource, &mut state, &tags.flatten()) {
        Ok(()) => {
            state.mark_applied(&created);
            return Progress::progress(resource, state);
        }
        Err(error) => error,
    };

    if !tags.resource.is_empty() || !is_tagging_authorization_failure(&error) {
        return seq.handle_error(STEP, Progress::progress(resource, state), &error, rules);
    }

    seq.note_soft_fail(&error);
    seq.note_remote_call(STEP);
    match create(&mut resource, &mut state, &tags.system_only().flatten()) {
        Ok(()) => {
            state.mark_applied(&created);
            state.mark_applied(&IdempotencyKey::tagging_fallback());
            state.mark_applied(&IdempotencyKey::tags_partially_applied());
            Progress::progress(resource, state)
        }
        Err(error) => seq.handle_error(STEP, Progress::progress(resource, state), &error, rules),
    }
}

/// Best-effort follow-up after a tagging fallback: add the stack and resource tiers.
///
/// Never fails the operation. Runs at most once per operation.
pub fn apply_remaining_tags<R, C>(
    seq: &Sequencer,
    resource: R,
    mut state: OperationState,
    client: &C,
    resource_id: &str,
    tags: &TagSet,
) -> Progress<R>
where
    C: TaggingClient + ?Sized,
{
    const STEP: &str = "tag-remaining";
    let attempted = IdempotencyKey::remaining_tags_attempted();
    let partial = IdempotencyKey::tags_partially_applied();

    if !state.is_applied(&IdempotencyKey::tagging_fallback()) {
        return Progress::progress(resource, state);
    }
    if state.is_applied(&attempted) {
        seq.note_skipped(STEP, &attempted);
        return Progress::progress(resource, state);
    }

    let remaining = tags.without_system().flatten();
    state.mark_applied(&attempted);
    if remaining.is_empty() {
        state.clear(&partial);
        return Progress::progress(resource, state);
    }

    seq.observer().on_step_started(seq.operation(), STEP);
    seq.note_remote_call(STEP);
    match client.add_tags(resource_id, &remaining) {
        Ok(()) => state.clear(&partial),
        Err(error) => seq.note_soft_fail(&error),
    }
    Progress::progress(resource, state)
}
