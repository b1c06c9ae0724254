// cascade-sim: cycle-accurate, discrete-event simulation kernel
// Component hierarchy, typed ports, clock-domain scheduling, checkpointing.

#![warn(clippy::all)]
#![warn(rust_2018_idioms)]

//! # Cascade
//!
//! A cycle-accurate, discrete-event simulation kernel for hardware-like
//! models: a component hierarchy of typed ports and FIFOs, organized into
//! clock domains that tick in a fixed four-phase order (`preTick` → `tick`
//! → `update` → `postTick`), with a time wheel coordinating any number of
//! independent and rationally-related clock domains.
//!
//! ## Key components
//!
//! - **Hierarchy**: the construction-time component tree and per-class
//!   interface descriptors ([`hierarchy`]).
//! - **Ports**: typed port declaration, connection, and net/register/fifo
//!   resolution ([`ports`], [`resolver`]).
//! - **Storage**: the delay-indexed byte layout each clock domain's
//!   terminal ports live in ([`storage`]).
//! - **Scheduler**: the per-domain update ordering respecting strong and
//!   weak precedence edges ([`scheduler`]).
//! - **Clock domain**: the runtime for one domain's tick cycle, driving
//!   its update byte-stream, trigger ring, and event queue ([`clockdomain`]).
//! - **Multi-domain**: the cooperative time wheel ordering any number of
//!   domains by next-edge time ([`multidomain`]).
//! - **FIFOs**: cross-domain queues with flow control ([`fifo`]).
//! - **Triggers**: edge-delayed and sticky wake conditions plus the
//!   generic event queue ([`triggers`]).
//! - **Archive**: checkpoint save/restore with a structural checksum
//!   ([`archive`]).
//! - **Sim**: the top-level handle tying construction, resolution, and
//!   run together ([`sim`]).
//!
//! ## Guarantees
//!
//! - Deterministic execution: same construction + same inputs → same
//!   trace, independent of host thread count.
//! - No allocation inside a clock domain's steady-state tick once
//!   resolution has finished sizing its storage and update list.
//! - A single [`error::FatalHook`] is the only place a runtime error can
//!   surface to the embedder; the kernel itself never aborts the process.
//!
//! ## Example
//!
//! ```rust
//! use cascade::prelude::*;
//! use cascade::ClockPeriods;
//!
//! let params = SimParamsBuilder::new().build().unwrap();
//! let mut sim = Sim::new(params);
//!
//! let periods = ClockPeriods::default();
//! let schedules = Default::default();
//! let counts = Default::default();
//! sim.resolve_and_schedule(&periods, &schedules, &counts, false).unwrap();
//! sim.reset(0).unwrap();
//! ```

pub mod archive;
pub mod clockdomain;
pub mod config;
pub mod const_pool;
pub mod error;
pub mod fifo;
pub mod hierarchy;
pub mod macros;
pub mod multidomain;
pub mod ports;
pub mod resolver;
pub mod scheduler;
pub mod sim;
pub mod storage;
pub mod triggers;

pub use archive::{ComponentArchive, DomainArchive, FifoArchive, PendingEventArchive, SimArchive};
pub use clockdomain::{ClockDomain, ClockSchedule, GeneratorRelation, UpdateEntry};
pub use config::{SimParams, SimParamsBuilder};
pub use const_pool::{ConstId, ConstantPool};
pub use error::{CascadeError, DefaultFatalHook, FatalHook, ResolutionError, RuntimeError, SimContext, StructuralError, Warning};
pub use fifo::{FifoKind, GenericFifo, PopOutcome, PushOutcome};
pub use hierarchy::{Component as HierarchyComponent, ComponentId, Hierarchy, InterfaceDescriptor, InterfaceDescriptorId};
pub use multidomain::{MultiDomainScheduler, round_edge};
pub use ports::{PortConnection, PortDirection, PortGraph, PortId, PortInfo, PortType};
pub use resolver::{compute_fifo_min_capacity, resolve_fifos, resolve_nets, resolve_registers, ClockPeriods};
pub use scheduler::schedule_domain;
pub use sim::{Component, Sim};
pub use triggers::{EventQueue, EventTypeId, EventTypeRegistry, ScheduledEvent, StickyTrigger, TriggerRecord, TriggerRing};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::{
        clockdomain::{ClockDomain, ClockSchedule},
        config::{SimParams, SimParamsBuilder},
        error::{CascadeError, FatalHook},
        hierarchy::Hierarchy,
        multidomain::MultiDomainScheduler,
        ports::{PortDirection, PortGraph},
        sim::{Component, Sim},
    };
}
