//! Error taxonomy for the simulation kernel.
//!
//! There is no try/recover inside a running simulation: construction and
//! resolution errors are returned to the caller, and a single
//! [`FatalHook`] formats and reports runtime errors. The hook never exits
//! the process — that decision belongs to the embedder.

use std::fmt;

/// Where in the simulation an error occurred.
#[derive(Debug, Clone, Default)]
pub struct SimContext {
    pub sim_time_ps: u64,
    pub current_update: Option<String>,
    pub component_path: Option<String>,
}

impl fmt::Display for SimContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t={}ps", self.sim_time_ps)?;
        if let Some(u) = &self.current_update {
            write!(f, " in update `{u}`")?;
        }
        if let Some(p) = &self.component_path {
            write!(f, " ({p})")?;
        }
        Ok(())
    }
}

/// Construction-time structural errors (§7, construction phase).
#[derive(Debug, thiserror::Error)]
pub enum StructuralError {
    #[error("illegal port connection between `{from}` and `{to}`: {reason}")]
    IllegalConnection { from: String, to: String, reason: String },
    #[error("port `{name}` declared with mismatched size: {a} vs {b} bytes")]
    SizeMismatch { name: String, a: u16, b: u16 },
    #[error("duplicate or unnamed required port `{name}` on `{component}`")]
    DuplicatePort { name: String, component: String },
    #[error("missing base class entries while validating `{class_name}`")]
    MissingBaseClass { class_name: String },
    #[error("connection across incompatible clock domains: `{from}` (domain {from_domain}) -> `{to}` (domain {to_domain})")]
    IncompatibleClockDomains {
        from: String,
        to: String,
        from_domain: u32,
        to_domain: u32,
    },
    #[error("dynamic port allocation after construction is not permitted: `{name}`")]
    DynamicPortAllocation { name: String },
}

/// Resolution-time errors (§7, init phase — after construction, before run).
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    #[error("port `{name}` is unreachable (no terminal resolves for it)")]
    UnreachableTerminal { name: String },
    #[error("combinational cycle detected")]
    CombinationalCycle { updates: Vec<String>, ports: Vec<String> },
    #[error("fifo `{name}` has no reader or writer and is not bit-bucketed/wired-to-zero")]
    FifoMissingEndpoint { name: String },
    #[error("fifo `{name}` capacity {capacity} is below the minimum {minimum} required with flow control disabled")]
    FifoBelowMinimum { name: String, capacity: u32, minimum: u32 },
    #[error("archive checksum mismatch: expected {expected:#010x}, found {found:#010x}")]
    ChecksumMismatch { expected: u32, found: u32 },
}

/// Runtime errors (§7, while the simulation is running).
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("read of invalid port `{name}` at {context}")]
    InvalidPortRead { name: String, context: SimContext },
    #[error("write to read-only port `{name}` at {context}")]
    WriteToReadOnly { name: String, context: SimContext },
    #[error("assignment to constant port `{name}` at {context}")]
    AssignToConstant { name: String, context: SimContext },
    #[error("deadlock: fifo `{name}` is non-empty with delay 0 and its consumer is inactive at {context}")]
    Deadlock { name: String, context: SimContext },
    #[error("reset did not converge after {iterations} iterations at {context}")]
    ResetNonConvergence { iterations: u32, context: SimContext },
    #[error("event scheduled with non-positive delay ({delay}) at {context}")]
    NonPositiveEventDelay { delay: i64, context: SimContext },
    #[error("simulation timeout after {elapsed_ns}ns")]
    Timeout { elapsed_ns: u64 },
}

/// Top-level error type returned by fallible kernel operations.
#[derive(Debug, thiserror::Error)]
pub enum CascadeError {
    #[error(transparent)]
    Structural(#[from] StructuralError),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Non-fatal advisories (§7).
#[derive(Debug, Clone, thiserror::Error)]
pub enum Warning {
    #[error("fifo `{name}` capacity {capacity} is below the recommended {recommended} for full throughput with flow control enabled")]
    FifoCapacityLow { name: String, capacity: u32, recommended: u32 },
    #[error("reset level {level} is unused by any component")]
    UnusedResetLevel { level: i32 },
    #[error("{count} component(s) leaked at teardown")]
    TeardownLeak { count: usize },
}

/// Formats and reports a fatal runtime error. The default implementation
/// logs via `tracing` and never aborts the host process — that decision is
/// left to the embedder, which receives the `Err` this hook was called
/// with back through the normal `Result` chain.
pub trait FatalHook: Send + Sync {
    fn on_fatal(&self, error: &RuntimeError);
}

/// Default hook: formats the error and its [`SimContext`] through `tracing`.
#[derive(Debug, Default)]
pub struct DefaultFatalHook;

impl FatalHook for DefaultFatalHook {
    fn on_fatal(&self, error: &RuntimeError) {
        tracing::error!(%error, "fatal simulation error");
    }
}
