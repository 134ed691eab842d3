//! Resumable Reconciliation Core for Resource Handlers
//!
//! Shared engine behind resource lifecycle handlers that create, read,
//! update, delete and list objects hosted by a remote management API.
//! Handlers express each operation as an ordered chain of steps; the chain
//! is re-run from the start on every invocation and suspends by returning
//! `Outcome::InProgress` with the state the host must hand back.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! // 1. One sequencer per operation
//! let seq = Sequencer::new(OperationKind::Update, config.clone());
//!
//! // 2. Chain steps; side effects are guarded by idempotency keys
//! Progress::progress(request.desired, OperationState::resume(state))
//!     .then(|r, s| {
//!         seq.initiate("modify", r, s)
//!             .idempotent(IdempotencyKey::for_step("modify"))
//!             .translate(to_modify_request)
//!             .call(|req| client.modify(req))
//!             .stabilize_probed("available", 2, |req, _| client.is_available(&req.id))
//!             .handle_error(specific_rules().or_else(default_rules()))
//!             .progress()
//!     })
//!     // 3. Reconcile tags across system/stack/resource tiers
//!     .then(|r, s| update_tags(&seq, r, s, &client, &arn, &prev_tags, &tags, &default_rules()))
//!     // 4. Hand the result to the host
//!     .into_outcome()
//! ```

#![warn(missing_docs)]

// === Core Types ===
mod context;
mod errors;
mod idempotency;
mod outcome;

// === Classification ===
mod rules;

// === Configuration ===
mod backoff;
mod config;

// === Execution ===
mod probe;
mod sequencer;
mod tags;
mod traits;

// === Host Loop ===
pub mod driver;

// === Observability ===
mod observer;
mod stats;

// === Test Support ===
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

#[cfg(test)]
mod scenarios;

// === Re-exports ===

// Types
pub use context::{OperationKind, OperationState, ProbeState};
pub use idempotency::IdempotencyKey;
pub use outcome::{ListPage, OperationStatus, Outcome, Progress};

// Errors
pub use errors::{ConfigError, ErrorKind, HandlerErrorCode, RemoteError, StateCodecError};

// Classification
pub use rules::{
    default_rules, handle_exception, handle_exception_with_delay, Disposition, Matcher, Rule,
    RuleSet, ACCESS_DENIED_CODES, ALREADY_EXISTS_CODES, CONFLICT_CODES, INVALID_REQUEST_CODES,
    NOT_FOUND_CODES, QUOTA_CODES, THROTTLING_CODES,
};

// Configuration
pub use backoff::BackoffPolicy;
pub use config::{
    HandlerConfig, ENV_BACKOFF_DELAY_SECONDS, ENV_BACKOFF_TIMEOUT_SECONDS, ENV_PROBING_ENABLED,
};

// Execution
pub use probe::{with_probing, Prober};
pub use sequencer::{Called, Initiated, Sequencer, Translated};
pub use tags::{
    apply_remaining_tags, create_with_tagging_fallback, diff, flatten,
    is_tagging_authorization_failure, update_tags, update_tags_access_denied_rules, TagDelta,
    TagMap, TagSet, TaggingClient, TAGGING_ACTION_MARKERS,
};
pub use traits::{HandlerRequest, ResourceHandler};

// Observability
pub use observer::{NoOpObserver, ReconcileObserver, TracingObserver};
pub use stats::{HandlerStats, HandlerStatsSnapshot};
