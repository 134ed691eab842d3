//! Debounced stabilization checks
//!
//! The remote control plane can flap between "done" and "not done" across
//! consecutive reads. With probing enabled a check is only confirmed after
//! `required_count` consecutive positive reads; any negative read resets
//! the count for that probe name.

use crate::{HandlerConfig, ProbeState};

/// Evaluate `check` through the debounce counter for `probe_name`.
///
/// With `enabled == false` the check result is returned as is.
pub fn with_probing<F>(
    probes: &mut ProbeState,
    enabled: bool,
    probe_name: &str,
    required_count: u32,
    check: F,
) -> bool
where
    F: FnOnce() -> bool,
{
    if !enabled {
        return check();
    }

    if !check() {
        probes.reset(probe_name);
        return false;
    }

    let seen = probes.increment(probe_name);
    if seen >= required_count.max(1) {
        probes.reset(probe_name);
        return true;
    }
    tracing::debug!(
        probe = %probe_name,
        seen,
        required_count,
        "Probe positive, awaiting confirmation"
    );
    false
}

/// Probing switch taken from [`HandlerConfig`]
#[derive(Clone, Copy, Debug, Default)]
pub struct Prober {
    enabled: bool,
}

impl Prober {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn from_config(config: &HandlerConfig) -> Self {
        Self::new(config.probing_enabled)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn probe<F>(
        &self,
        probes: &mut ProbeState,
        probe_name: &str,
        required_count: u32,
        check: F,
    ) -> bool
    where
        F: FnOnce() -> bool,
    {
        with_probing(probes, self.enabled, probe_name, required_count, check)
    }
}
