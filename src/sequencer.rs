//! Step sequencing for resumable workflows
//!
//! An operation is an ordered chain of steps joined with [`Progress::then`].
//! There is no in-process memory across invocations: every invocation
//! re-runs the chain from the start, and steps with side effects consult
//! their [`IdempotencyKey`] in [`OperationState`] to become no-ops once
//! applied. Observation-only steps (stabilization) re-run every time.
//!
//! ```rust,ignore
//! Progress::progress(resource, state)
//!     .then(|r, s| {
//!         seq.initiate("modify-cluster", r, s)
//!             .idempotent(IdempotencyKey::for_step("modify-cluster"))
//!             .translate(|r| ModifyRequest::from(r))
//!             .call(|req| api.modify(req))
//!             .stabilize_probed("cluster-available", 2, |_, r| api.is_available(&r.name))
//!             .handle_error(default_rules())
//!             .progress()
//!     })
//!     .into_outcome()
//! ```

use crate::{
    default_rules, rules::apply_disposition, Disposition, HandlerConfig, HandlerStats,
    IdempotencyKey, NoOpObserver, OperationKind, OperationState, Progress, Prober,
    ReconcileObserver, RemoteError, RuleSet,
};
use std::sync::Arc;
use std::time::Duration;

type ResponseHook<'a, R, Resp> = Box<dyn FnOnce(&Resp, &mut R, &mut OperationState) + 'a>;
type StabilizeCheck<'a, R, Req> =
    Box<dyn FnOnce(&Req, &R, &mut OperationState) -> Result<bool, RemoteError> + 'a>;

/// Runs steps of one operation with shared config, observer and counters
pub struct Sequencer {
    operation: OperationKind,
    config: HandlerConfig,
    observer: Arc<dyn ReconcileObserver>,
    stats: Arc<HandlerStats>,
}

impl Sequencer {
    pub fn new(operation: OperationKind, config: HandlerConfig) -> Self {
        Self {
            operation,
            config,
            observer: Arc::new(NoOpObserver),
            stats: Arc::new(HandlerStats::new()),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ReconcileObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_stats(mut self, stats: Arc<HandlerStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn operation(&self) -> OperationKind {
        self.operation
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    pub fn prober(&self) -> Prober {
        Prober::from_config(&self.config)
    }

    pub fn stats(&self) -> &Arc<HandlerStats> {
        &self.stats
    }

    pub fn observer(&self) -> &dyn ReconcileObserver {
        self.observer.as_ref()
    }

    /// Delay reported with every `InProgress` this sequencer emits
    pub fn delay_seconds(&self) -> u32 {
        self.config.backoff.delay_seconds()
    }

    /// Start a remote-call step
    pub fn initiate<R>(&self, step: &str, resource: R, state: OperationState) -> Initiated<'_, R> {
        self.observer.on_step_started(self.operation, step);
        Initiated {
            seq: self,
            step: step.into(),
            resource,
            state,
            guard: None,
        }
    }

    /// Classify `error` for `step` and fold it into `progress`
    pub fn handle_error<R>(
        &self,
        step: &str,
        progress: Progress<R>,
        error: &RemoteError,
        rules: &RuleSet,
    ) -> Progress<R> {
        let disposition = rules.classify(error);
        self.observer
            .on_error_classified(self.operation, step, error, disposition);
        match disposition {
            Disposition::Ignore | Disposition::IgnoreWithStatus(_) => {
                HandlerStats::bump(&self.stats.errors_ignored)
            }
            Disposition::FailWith(_) => HandlerStats::bump(&self.stats.errors_failed),
            Disposition::Unclassified => HandlerStats::bump(&self.stats.errors_unclassified),
        }

        let span = tracing::debug_span!("classify", operation = %self.operation, step = %step);
        let out = span.in_scope(|| {
            apply_disposition(progress, error, disposition, self.delay_seconds())
        });
        if let Progress::InProgress { delay_seconds, .. } = &out {
            self.note_suspended(step, *delay_seconds);
        }
        out
    }

    /// Observation-only step: suspend until `check` is confirmed stable.
    ///
    /// Re-runs on every invocation until it passes.
    pub fn await_stable<R, F>(
        &self,
        step: &str,
        resource: R,
        mut state: OperationState,
        probe_name: &str,
        required_count: u32,
        check: F,
        rules: &RuleSet,
    ) -> Progress<R>
    where
        F: FnOnce(&R) -> Result<bool, RemoteError>,
    {
        self.observer.on_step_started(self.operation, step);
        HandlerStats::bump(&self.stats.stabilization_checks);
        match check(&resource) {
            Ok(read) => {
                let stable = self
                    .prober()
                    .probe(state.probes_mut(), probe_name, required_count, || read);
                self.finish_stabilization(step, resource, state, stable)
            }
            Err(error) => {
                // a failed read never counts towards confirmation
                state.probes_mut().reset(probe_name);
                self.handle_error(step, Progress::progress(resource, state), &error, rules)
            }
        }
    }

    /// Artificial delay: suspend until `total` has been waited across invocations
    pub fn wait<R>(
        &self,
        step: &str,
        resource: R,
        mut state: OperationState,
        total: Duration,
    ) -> Progress<R> {
        if state.waited_seconds() >= total.as_secs() {
            return Progress::progress(resource, state);
        }
        // a zero delay would never advance the timer
        let delay = self.delay_seconds().max(1);
        state.advance_wait(u64::from(delay));
        self.note_suspended(step, delay);
        Progress::in_progress(resource, state, delay)
    }

    pub(crate) fn note_remote_call(&self, step: &str) {
        self.observer.on_remote_call(self.operation, step);
        HandlerStats::bump(&self.stats.remote_calls);
    }

    pub(crate) fn note_skipped(&self, step: &str, key: &IdempotencyKey) {
        self.observer.on_call_skipped(self.operation, step, key);
        HandlerStats::bump(&self.stats.calls_skipped);
    }

    pub(crate) fn note_soft_fail(&self, error: &RemoteError) {
        self.observer.on_tagging_soft_fail(self.operation, error);
        HandlerStats::bump(&self.stats.tagging_soft_fails);
    }

    fn note_suspended(&self, step: &str, delay_seconds: u32) {
        self.observer.on_suspended(self.operation, step, delay_seconds);
        HandlerStats::bump(&self.stats.suspensions);
    }

    fn finish_stabilization<R>(
        &self,
        step: &str,
        resource: R,
        state: OperationState,
        stable: bool,
    ) -> Progress<R> {
        self.observer
            .on_stabilization_check(self.operation, step, stable);
        if stable {
            Progress::progress(resource, state)
        } else {
            let delay = self.delay_seconds();
            self.note_suspended(step, delay);
            Progress::in_progress(resource, state, delay)
        }
    }
}

/// A step that has been started but not yet translated
pub struct Initiated<'a, R> {
    seq: &'a Sequencer,
    step: Box<str>,
    resource: R,
    state: OperationState,
    guard: Option<IdempotencyKey>,
}

impl<'a, R> Initiated<'a, R> {
    /// Make the remote call at-most-once per operation, guarded by `key`
    pub fn idempotent(mut self, key: IdempotencyKey) -> Self {
        self.guard = Some(key);
        self
    }

    /// Build the remote request; must be pure
    pub fn translate<Req, F>(self, translate: F) -> Translated<'a, R, Req>
    where
        F: FnOnce(&R) -> Req,
    {
        let request = translate(&self.resource);
        Translated {
            init: self,
            request,
        }
    }
}

/// Step with its remote request built, ready to call
pub struct Translated<'a, R, Req> {
    init: Initiated<'a, R>,
    request: Req,
}

impl<'a, R, Req> Translated<'a, R, Req> {
    /// Perform the remote call, unless the guard flag says it already happened.
    ///
    /// On success the guard flag is set before anything else runs.
    pub fn call<Resp, F>(self, call: F) -> Called<'a, R, Req, Resp>
    where
        F: FnOnce(&Req) -> Result<Resp, RemoteError>,
    {
        let Translated { init, request } = self;
        let Initiated {
            seq,
            step,
            resource,
            mut state,
            guard,
        } = init;

        let result = match &guard {
            Some(key) if state.is_applied(key) => {
                seq.note_skipped(&step, key);
                CallResult::Skipped
            }
            _ => {
                seq.note_remote_call(&step);
                match call(&request) {
                    Ok(response) => {
                        if let Some(key) = &guard {
                            state.mark_applied(key);
                        }
                        CallResult::Done(response)
                    }
                    Err(error) => CallResult::Failed(error),
                }
            }
        };

        Called {
            seq,
            step,
            resource,
            state,
            request,
            result,
            on_response: None,
            stabilize: None,
            rules: None,
        }
    }
}

enum CallResult<Resp> {
    Skipped,
    Done(Resp),
    Failed(RemoteError),
}

/// A step whose remote call has run; finish it with [`Called::progress`]
pub struct Called<'a, R, Req, Resp> {
    seq: &'a Sequencer,
    step: Box<str>,
    resource: R,
    state: OperationState,
    request: Req,
    result: CallResult<Resp>,
    on_response: Option<ResponseHook<'a, R, Resp>>,
    stabilize: Option<StabilizeCheck<'a, R, Req>>,
    rules: Option<RuleSet>,
}

impl<'a, R, Req, Resp> Called<'a, R, Req, Resp> {
    /// Fold the response into the resource and state (only when the call actually ran)
    pub fn on_response<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&Resp, &mut R, &mut OperationState) + 'a,
    {
        self.on_response = Some(Box::new(hook));
        self
    }

    /// Suspend until `check` returns true; re-checked on every invocation
    pub fn stabilize<F>(mut self, check: F) -> Self
    where
        F: FnOnce(&Req, &R, &mut OperationState) -> Result<bool, RemoteError> + 'a,
    {
        self.stabilize = Some(Box::new(check));
        self
    }

    /// Like [`Called::stabilize`], debounced through the prober under `probe_name`
    pub fn stabilize_probed<F>(self, probe_name: &'a str, required_count: u32, check: F) -> Self
    where
        F: FnOnce(&Req, &R) -> Result<bool, RemoteError> + 'a,
    {
        let prober = self.seq.prober();
        self.stabilize(move |request, resource, state| {
            match check(request, resource) {
                Ok(read) => {
                    Ok(prober.probe(state.probes_mut(), probe_name, required_count, || read))
                }
                Err(error) => {
                    state.probes_mut().reset(probe_name);
                    Err(error)
                }
            }
        })
    }

    /// Rules used for call and stabilization errors; defaults to [`default_rules`]
    pub fn handle_error(mut self, rules: RuleSet) -> Self {
        self.rules = Some(rules);
        self
    }

    /// Finish the step
    pub fn progress(self) -> Progress<R> {
        let Called {
            seq,
            step,
            mut resource,
            mut state,
            request,
            result,
            on_response,
            stabilize,
            rules,
        } = self;
        let rules = rules.unwrap_or_else(default_rules);

        match result {
            CallResult::Failed(error) => {
                return seq.handle_error(&step, Progress::progress(resource, state), &error, &rules);
            }
            CallResult::Done(response) => {
                if let Some(hook) = on_response {
                    hook(&response, &mut resource, &mut state);
                }
            }
            CallResult::Skipped => {}
        }

        let Some(check) = stabilize else {
            return Progress::progress(resource, state);
        };

        HandlerStats::bump(&seq.stats.stabilization_checks);
        match check(&request, &resource, &mut state) {
            Ok(stable) => seq.finish_stabilization(&step, resource, state, stable),
            Err(error) => {
                seq.handle_error(&step, Progress::progress(resource, state), &error, &rules)
            }
        }
    }

    /// Finish the step and continue with `next` if still progressing
    pub fn done<F>(self, next: F) -> Progress<R>
    where
        F: FnOnce(R, OperationState) -> Progress<R>,
    {
        self.progress().then(next)
    }
}
