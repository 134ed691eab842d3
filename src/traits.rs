//! Host-facing handler trait

use crate::{ListPage, OperationState, Outcome, TagSet};

/// Inputs the host supplies with every create/update invocation
#[derive(Clone, Debug, PartialEq)]
pub struct HandlerRequest<R> {
    /// Desired resource model
    pub desired: R,
    /// Resource model before this operation (updates only)
    pub previous: Option<R>,
    /// Tags requested for this operation
    pub desired_tags: TagSet,
    /// Tags applied before this operation (updates only)
    pub previous_tags: TagSet,
}

impl<R> HandlerRequest<R> {
    /// Request for a create (no previous model)
    pub fn new(desired: R, desired_tags: TagSet) -> Self {
        Self {
            desired,
            previous: None,
            desired_tags,
            previous_tags: TagSet::default(),
        }
    }

    /// Attach the pre-update model and tags
    pub fn with_previous(mut self, previous: R, previous_tags: TagSet) -> Self {
        self.previous = Some(previous);
        self.previous_tags = previous_tags;
        self
    }
}

/// Lifecycle operations for one resource type.
///
/// Every mutating operation takes the state persisted by the host from the
/// previous invocation (`None` on the first one) and returns an
/// [`Outcome`]. An `InProgress` outcome means "re-invoke me with this state
/// after the delay".
///
/// # Example
///
/// ```rust,ignore
/// impl ResourceHandler for SubnetGroupHandler {
///     type Resource = SubnetGroup;
///
///     fn create(&self, request: HandlerRequest<SubnetGroup>, state: Option<OperationState>)
///         -> Outcome<SubnetGroup>
///     {
///         let seq = Sequencer::new(OperationKind::Create, self.config.clone());
///         Progress::progress(request.desired, OperationState::resume(state))
///             .then(|r, s| {
///                 let tags = &request.desired_tags;
///                 create_with_tagging_fallback(&seq, r, s, tags, &default_rules(), |r, s, flat| {
///                     /* call the API */
///                 })
///             })
///             .into_outcome()
///     }
///     // ...
/// }
/// ```
pub trait ResourceHandler: Send + Sync {
    /// Resource model handled by this type
    type Resource: Clone + Send;

    /// Create the resource, resuming from `state` when given
    fn create(
        &self,
        request: HandlerRequest<Self::Resource>,
        state: Option<OperationState>,
    ) -> Outcome<Self::Resource>;

    /// Single observation; never suspends
    fn read(&self, resource: Self::Resource) -> Outcome<Self::Resource>;

    /// Converge the remote object onto `request.desired`
    fn update(
        &self,
        request: HandlerRequest<Self::Resource>,
        state: Option<OperationState>,
    ) -> Outcome<Self::Resource>;

    /// Delete and wait until the remote reports the object gone
    fn delete(
        &self,
        resource: Self::Resource,
        state: Option<OperationState>,
    ) -> Outcome<Self::Resource>;

    /// Pass-through page listing; no stabilization or tagging
    fn list(&self, page_token: Option<String>) -> Outcome<ListPage<Self::Resource>>;
}
