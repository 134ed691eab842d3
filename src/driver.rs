//! Local re-invocation loop
//!
//! Plays the host's role for tests and local tooling: persists the state
//! between invocations, waits the requested delay, and abandons an
//! operation that is still in progress after the backoff timeout.

use crate::{BackoffPolicy, HandlerErrorCode, OperationState, Outcome};
use std::time::Duration;
use tokio::time::Instant;

/// Re-invoke `invoke` until it returns a terminal outcome or `backoff` times out
pub async fn drive<R, F>(backoff: &BackoffPolicy, mut invoke: F) -> Outcome<R>
where
    F: FnMut(Option<OperationState>) -> Outcome<R>,
{
    let started = Instant::now();
    let mut state = None;
    let mut invocations: u32 = 0;

    loop {
        invocations += 1;
        match invoke(state.take()) {
            Outcome::InProgress {
                state: next,
                delay_seconds,
                ..
            } => {
                let delay = Duration::from_secs(u64::from(delay_seconds));
                if backoff.is_exhausted(started.elapsed() + delay) {
                    tracing::warn!(
                        invocations,
                        timeout_seconds = backoff.timeout().as_secs(),
                        "Operation did not stabilize in time, abandoning"
                    );
                    return Outcome::Failed {
                        code: HandlerErrorCode::NotStabilized,
                        message: format!(
                            "operation still in progress after {}s",
                            started.elapsed().as_secs()
                        )
                        .into(),
                    };
                }
                tracing::debug!(invocations, delay_seconds, "Re-invoking after delay");
                tokio::time::sleep(delay).await;
                state = Some(next);
            }
            terminal => {
                tracing::debug!(invocations, "Operation finished");
                return terminal;
            }
        }
    }
}
