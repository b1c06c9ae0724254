//! Configuration surface.
//!
//! This is a closed set of options, represented as a plain struct rather
//! than a reflective property bag, built with a [`SimParamsBuilder`] in an
//! immutable-after-build style. Parsing these values out of argv, a TOML
//! file, or anything else is an external CLI concern — the builder only
//! validates the closed set itself.

use serde::{Deserialize, Serialize};

/// Closed set of simulation-wide options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimParams {
    pub default_clock_period_ps: u64,
    pub clock_rounding_ps: u64,
    pub traces: String,
    pub trace_start_ns: u64,
    pub trace_stop_ns: u64,
    pub dump_signals: String,
    pub waves_file: String,
    pub waves_timescale: String,
    pub waves_dt_ps: u32,
    pub checkpoint_interval_ns: u32,
    pub checkpoint_name: String,
    pub restore_from: String,
    pub validate_against: String,
    pub safe_checkpoint: bool,
    pub exact_port_names: bool,
    pub verbose: bool,
    pub max_reset_iterations: u32,
    pub timeout_ns: u64,
    pub finish_ns: u64,
    pub fifo_size_warnings: bool,
    /// 0 means "use `num_cpus::get()`".
    pub num_threads: u32,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            default_clock_period_ps: 1_000_000,
            clock_rounding_ps: 1,
            traces: String::new(),
            trace_start_ns: 0,
            trace_stop_ns: u64::MAX,
            dump_signals: String::new(),
            waves_file: String::new(),
            waves_timescale: "1ps".to_string(),
            waves_dt_ps: 1,
            checkpoint_interval_ns: 0,
            checkpoint_name: String::new(),
            restore_from: String::new(),
            validate_against: String::new(),
            safe_checkpoint: true,
            exact_port_names: false,
            verbose: false,
            max_reset_iterations: 100,
            timeout_ns: 0,
            finish_ns: u64::MAX,
            fifo_size_warnings: true,
            num_threads: 0,
        }
    }
}

impl SimParams {
    /// Resolved thread count honoring the `0 == auto` convention.
    pub fn resolved_thread_count(&self) -> usize {
        if self.num_threads == 0 {
            num_cpus::get().max(1)
        } else {
            self.num_threads as usize
        }
    }
}

/// Builder that validates the closed option set before producing an
/// immutable [`SimParams`].
#[derive(Debug, Default)]
pub struct SimParamsBuilder {
    params: SimParams,
}

impl SimParamsBuilder {
    pub fn new() -> Self {
        Self { params: SimParams::default() }
    }

    pub fn default_clock_period_ps(mut self, ps: u64) -> Self {
        self.params.default_clock_period_ps = ps;
        self
    }

    pub fn clock_rounding_ps(mut self, ps: u64) -> Self {
        self.params.clock_rounding_ps = ps;
        self
    }

    pub fn max_reset_iterations(mut self, n: u32) -> Self {
        self.params.max_reset_iterations = n;
        self
    }

    pub fn timeout_ns(mut self, ns: u64) -> Self {
        self.params.timeout_ns = ns;
        self
    }

    pub fn finish_ns(mut self, ns: u64) -> Self {
        self.params.finish_ns = ns;
        self
    }

    pub fn num_threads(mut self, n: u32) -> Self {
        self.params.num_threads = n;
        self
    }

    pub fn fifo_size_warnings(mut self, on: bool) -> Self {
        self.params.fifo_size_warnings = on;
        self
    }

    pub fn verbose(mut self, on: bool) -> Self {
        self.params.verbose = on;
        self
    }

    /// Validates the closed set and produces the final, immutable params.
    pub fn build(self) -> Result<SimParams, String> {
        let p = self.params;
        if p.default_clock_period_ps == 0 {
            return Err("default_clock_period_ps must be non-zero".to_string());
        }
        if p.max_reset_iterations == 0 {
            return Err("max_reset_iterations must be non-zero".to_string());
        }
        if p.finish_ns == 0 {
            return Err("finish_ns must be non-zero".to_string());
        }
        Ok(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_params_are_valid() {
        assert!(SimParamsBuilder::new().build().is_ok());
    }

    #[test]
    fn zero_period_is_rejected() {
        let err = SimParamsBuilder::new().default_clock_period_ps(0).build();
        assert!(err.is_err());
    }

    #[test]
    fn auto_thread_count_uses_num_cpus() {
        let p = SimParamsBuilder::new().num_threads(0).build().unwrap();
        assert!(p.resolved_thread_count() >= 1);
    }

    #[test]
    fn explicit_thread_count_is_honored() {
        let p = SimParamsBuilder::new().num_threads(4).build().unwrap();
        assert_eq!(p.resolved_thread_count(), 4);
    }
}
