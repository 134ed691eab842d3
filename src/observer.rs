//! Reconciliation observer trait

use crate::{Disposition, IdempotencyKey, OperationKind, RemoteError};

/// Observer trait for external observability
pub trait ReconcileObserver: Send + Sync + 'static {
    fn on_step_started(&self, operation: OperationKind, step: &str);
    fn on_call_skipped(&self, operation: OperationKind, step: &str, key: &IdempotencyKey);
    fn on_remote_call(&self, operation: OperationKind, step: &str);
    fn on_error_classified(
        &self,
        operation: OperationKind,
        step: &str,
        error: &RemoteError,
        disposition: Disposition,
    );
    fn on_stabilization_check(&self, operation: OperationKind, step: &str, stable: bool);
    fn on_suspended(&self, operation: OperationKind, step: &str, delay_seconds: u32);
    fn on_tagging_soft_fail(&self, operation: OperationKind, error: &RemoteError);
}

/// No-op observer
pub struct NoOpObserver;

impl ReconcileObserver for NoOpObserver {
    fn on_step_started(&self, _operation: OperationKind, _step: &str) {}
    fn on_call_skipped(&self, _operation: OperationKind, _step: &str, _key: &IdempotencyKey) {}
    fn on_remote_call(&self, _operation: OperationKind, _step: &str) {}
    fn on_error_classified(
        &self,
        _operation: OperationKind,
        _step: &str,
        _error: &RemoteError,
        _disposition: Disposition,
    ) {
    }
    fn on_stabilization_check(&self, _operation: OperationKind, _step: &str, _stable: bool) {}
    fn on_suspended(&self, _operation: OperationKind, _step: &str, _delay_seconds: u32) {}
    fn on_tagging_soft_fail(&self, _operation: OperationKind, _error: &RemoteError) {}
}

/// Tracing-based observer
pub struct TracingObserver;

impl ReconcileObserver for TracingObserver {
    fn on_step_started(&self, operation: OperationKind, step: &str) {
        tracing::debug!(operation = %operation, step = %step, "Step started");
    }

    fn on_call_skipped(&self, operation: OperationKind, step: &str, key: &IdempotencyKey) {
        tracing::info!(
            operation = %operation,
            step = %step,
            flag = %key,
            "Side effect already applied, skipping call"
        );
    }

    fn on_remote_call(&self, operation: OperationKind, step: &str) {
        tracing::debug!(operation = %operation, step = %step, "Remote call");
    }

    fn on_error_classified(
        &self,
        _operation: OperationKind,
        _step: &str,
        _error: &RemoteError,
        _disposition: Disposition,
    ) {
        // the classifier logs the error inside the step's span
    }

    fn on_stabilization_check(&self, operation: OperationKind, step: &str, stable: bool) {
        tracing::debug!(operation = %operation, step = %step, stable, "Stabilization check");
    }

    fn on_suspended(&self, operation: OperationKind, step: &str, delay_seconds: u32) {
        tracing::info!(operation = %operation, step = %step, delay_seconds, "Operation suspended");
    }

    fn on_tagging_soft_fail(&self, operation: OperationKind, error: &RemoteError) {
        tracing::warn!(
            operation = %operation,
            error = %error,
            "Tagging not authorized, continuing without the affected tags"
        );
    }
}
