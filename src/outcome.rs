//! Step and operation results

use crate::{HandlerErrorCode, IdempotencyKey, OperationState};
use serde::{Deserialize, Serialize};

/// Non-failure status a swallowed error can force
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationStatus {
    /// Suspend and ask the host to re-invoke
    InProgress,
    /// Finish the operation successfully
    Success,
}

/// Result of one step inside a chain.
///
/// Only `Progressing` lets the next step run; every other variant
/// short-circuits the rest of the chain.
#[derive(Clone, Debug, PartialEq)]
pub enum Progress<R> {
    /// Step finished, continue with the next one in this invocation
    Progressing { resource: R, state: OperationState },
    /// Suspend; the host re-invokes after `delay_seconds`
    InProgress {
        resource: R,
        state: OperationState,
        delay_seconds: u32,
    },
    /// Operation finished early
    Success { resource: R, state: OperationState },
    /// Terminal failure
    Failed {
        code: HandlerErrorCode,
        message: Box<str>,
    },
}

impl<R> Progress<R> {
    pub fn progress(resource: R, state: OperationState) -> Self {
        Self::Progressing { resource, state }
    }

    pub fn in_progress(resource: R, state: OperationState, delay_seconds: u32) -> Self {
        Self::InProgress {
            resource,
            state,
            delay_seconds,
        }
    }

    pub fn success(resource: R, state: OperationState) -> Self {
        Self::Success { resource, state }
    }

    pub fn failed(code: HandlerErrorCode, message: impl Into<Box<str>>) -> Self {
        Self::Failed {
            code,
            message: message.into(),
        }
    }

    /// Run `step` only if the chain is still progressing
    pub fn then<F>(self, step: F) -> Self
    where
        F: FnOnce(R, OperationState) -> Progress<R>,
    {
        match self {
            Self::Progressing { resource, state } => step(resource, state),
            other => other,
        }
    }

    /// Force a status on a non-failed progress, keeping resource and state
    pub fn with_status(self, status: OperationStatus, delay_seconds: u32) -> Self {
        let (resource, state) = match self {
            Self::Progressing { resource, state }
            | Self::InProgress {
                resource, state, ..
            }
            | Self::Success { resource, state } => (resource, state),
            failed @ Self::Failed { .. } => return failed,
        };
        match status {
            OperationStatus::InProgress => Self::in_progress(resource, state, delay_seconds),
            OperationStatus::Success => Self::success(resource, state),
        }
    }

    pub fn is_progressing(&self) -> bool {
        matches!(self, Self::Progressing { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn resource(&self) -> Option<&R> {
        match self {
            Self::Progressing { resource, .. }
            | Self::InProgress { resource, .. }
            | Self::Success { resource, .. } => Some(resource),
            Self::Failed { .. } => None,
        }
    }

    pub fn state(&self) -> Option<&OperationState> {
        match self {
            Self::Progressing { state, .. }
            | Self::InProgress { state, .. }
            | Self::Success { state, .. } => Some(state),
            Self::Failed { .. } => None,
        }
    }

    /// Close the chain into the host-facing outcome.
    ///
    /// A chain that ran to the end without suspending is a success. State
    /// is dropped on every terminal outcome.
    pub fn into_outcome(self) -> Outcome<R> {
        match self {
            Self::Progressing { resource, state } | Self::Success { resource, state } => {
                let message = state
                    .is_applied(&IdempotencyKey::tags_partially_applied())
                    .then(|| Box::from("tags partially applied"));
                Outcome::Success { resource, message }
            }
            Self::InProgress {
                resource,
                state,
                delay_seconds,
            } => Outcome::InProgress {
                resource,
                state,
                delay_seconds,
            },
            Self::Failed { code, message } => Outcome::Failed { code, message },
        }
    }
}

/// Result of one invocation, as seen by the host
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome<R> {
    /// Persist `state` and re-invoke after at least `delay_seconds`
    InProgress {
        resource: R,
        state: OperationState,
        delay_seconds: u32,
    },
    /// Terminal success; `message` carries degraded-success notes
    Success {
        resource: R,
        message: Option<Box<str>>,
    },
    /// Terminal failure
    Failed {
        code: HandlerErrorCode,
        message: Box<str>,
    },
}

impl<R> Outcome<R> {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress { .. })
    }

    /// Failure code, if this is a failure
    pub fn code(&self) -> Option<HandlerErrorCode> {
        match self {
            Self::Failed { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// One page of a `list` call
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ListPage<R> {
    pub resources: Vec<R>,
    pub next_page_token: Option<String>,
}
