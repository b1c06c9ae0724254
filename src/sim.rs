//! Top-level simulation object tying every module together.
//!
//! `Sim` walks the simulation lifecycle end to end: construction (the
//! embedder declares components, ports, and updates), resolution (run
//! exactly once), scheduling, and the run loop that drives the
//! multi-domain scheduler.

use rustc_hash::FxHashMap;

use crate::archive::{self, ComponentArchive, DomainArchive, FifoArchive, PendingEventArchive, SimArchive, END_OF_ARCHIVE_MAGIC};
use crate::clockdomain::{ClockDomain, ClockSchedule};
use crate::config::SimParams;
use crate::const_pool::ConstantPool;
use crate::error::{CascadeError, DefaultFatalHook, FatalHook, StructuralError, Warning};
use crate::fifo::GenericFifo;
use crate::hierarchy::Hierarchy;
use crate::multidomain::MultiDomainScheduler;
use crate::ports::PortGraph;
use crate::resolver::{self, ClockPeriods};
use crate::scheduler;
use crate::triggers::ScheduledEvent;

/// Reconstructs a boxed [`ScheduledEvent`] from its archived type id,
/// callback id, and payload bytes. Only the embedder knows how to rebuild
/// its own event types, so [`Sim::restore`] defers to this hook instead of
/// assuming a default no-op event; with no hook installed, archived pending
/// events are dropped on restore rather than silently fabricated.
pub trait EventFactory: Send {
    fn recreate(&self, type_id: u32, callback_id: u32, payload: &[u8]) -> Option<Box<dyn ScheduledEvent>>;
}

/// User-implemented simulation component, in place of virtual dispatch.
pub trait Component: Send {
    fn update(&mut self) {}
    fn tick(&mut self) {}
    fn reset(&mut self, _level: i32) {}
    fn archive(&self) -> Vec<u8> {
        Vec::new()
    }
    fn restore(&mut self, _bytes: &[u8]) {}
    fn is_active(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Construct,
    Resolved,
    Running,
}

/// Owns every piece of simulation state and enforces phase ordering:
/// construction, then resolution exactly once, then running.
pub struct Sim {
    pub params: SimParams,
    pub hierarchy: Hierarchy,
    pub ports: PortGraph,
    pub constants: ConstantPool,
    pub warnings: Vec<Warning>,
    fatal_hook: Box<dyn FatalHook>,
    event_factory: Option<Box<dyn EventFactory>>,
    scheduler: Option<MultiDomainScheduler>,
    component_paths: Vec<String>,
    components: Vec<Box<dyn Component>>,
    fifos: Vec<(String, GenericFifo, u32)>,
    phase: Phase,
}

impl Sim {
    pub fn new(params: SimParams) -> Self {
        Self {
            params,
            hierarchy: Hierarchy::new(),
            ports: PortGraph::new(),
            constants: ConstantPool::new(),
            warnings: Vec::new(),
            fatal_hook: Box::new(DefaultFatalHook),
            event_factory: None,
            scheduler: None,
            component_paths: Vec::new(),
            components: Vec::new(),
            fifos: Vec::new(),
            phase: Phase::Construct,
        }
    }

    pub fn set_fatal_hook(&mut self, hook: Box<dyn FatalHook>) {
        self.fatal_hook = hook;
    }

    /// Installs the hook `restore` uses to rebuild archived generic
    /// scheduled events. Without one, `restore` leaves archived pending
    /// events unscheduled.
    pub fn set_event_factory(&mut self, factory: Box<dyn EventFactory>) {
        self.event_factory = Some(factory);
    }

    pub fn add_component(&mut self, path: impl Into<String>, component: Box<dyn Component>) {
        self.component_paths.push(path.into());
        self.components.push(component);
    }

    pub fn add_fifo(&mut self, name: impl Into<String>, fifo: GenericFifo, consumer_domain: u32) {
        self.fifos.push((name.into(), fifo, consumer_domain));
    }

    /// Closes construction and runs cheap structural validation (single
    /// producer, read-only writers, delay and fifo-size limits).
    fn finish_construction(&mut self) -> Result<(), CascadeError> {
        if self.phase != Phase::Construct {
            return Err(StructuralError::DynamicPortAllocation { name: "<sim>".to_string() }.into());
        }
        self.ports.finish();
        self.ports.validate()?;
        Ok(())
    }

    /// Runs the resolver passes in source order and builds
    /// the per-domain update order and storage plan. `schedules` gives
    /// each domain id its clock schedule and its update-node count plus
    /// closures are supplied by the caller via `domain_updates` — this
    /// kernel does not itself know how many updates a domain has until
    /// the embedder finishes registering them.
    pub fn resolve_and_schedule(
        &mut self,
        periods: &ClockPeriods,
        schedules: &FxHashMap<u32, ClockSchedule>,
        domain_update_counts: &FxHashMap<u32, u32>,
        debug_validity: bool,
    ) -> Result<(), CascadeError> {
        self.finish_construction()?;

        resolver::resolve_fifos(&mut self.ports, periods)?;
        resolver::resolve_nets(&mut self.ports)?;
        resolver::resolve_registers(&mut self.ports)?;

        let edges = resolver::build_update_edges(&self.ports);
        let mut domains = Vec::new();

        for (&domain_id, &schedule) in schedules {
            let node_count = *domain_update_counts.get(&domain_id).unwrap_or(&0);
            let domain_edges: Vec<_> = edges
                .iter()
                .filter(|e| self.ports.get(e.port).clock_domain == domain_id)
                .copied()
                .collect();
            let order = scheduler::schedule_domain(node_count, &domain_edges)?;
            let positions = scheduler::positions(&order);
            resolver::fake_register_optimization(&mut self.ports, &positions);

            let storage = crate::storage::plan_domain_storage(&self.ports, domain_id, debug_validity);
            domains.push(ClockDomain::new(domain_id, schedule, storage));
        }

        let (cross_pre_tick, cross_tick_side) = crate::storage::plan_cross_domain_copies(&self.ports, &domains);
        let mut scheduler = MultiDomainScheduler::new(domains, self.params.clock_rounding_ps, self.params.timeout_ns);
        scheduler.set_cross_domain_copies(cross_pre_tick, cross_tick_side);
        self.scheduler = Some(scheduler);
        self.phase = Phase::Resolved;
        Ok(())
    }

    /// Looks up a resolved domain by id so the embedder can push the
    /// [`crate::clockdomain::UpdateEntry`] closures its components need
    /// — only valid once [`Sim::resolve_and_schedule`]
    /// has run and sized that domain's storage.
    pub fn domain_mut(&mut self, id: u32) -> Option<&mut ClockDomain> {
        self.scheduler.as_mut()?.domains.iter_mut().find(|d| d.id == id)
    }

    /// Resets every domain, propagating values as in `tick` until outputs
    /// stabilize or `max_reset_iterations` is reached.
    pub fn reset(&mut self, level: i32) -> Result<(), CascadeError> {
        for component in &mut self.components {
            component.reset(level);
        }
        if let Some(scheduler) = &mut self.scheduler {
            for domain in &mut scheduler.domains {
                domain.reset(self.params.max_reset_iterations).map_err(|e| {
                    self.fatal_hook.on_fatal(&e);
                    CascadeError::from(e)
                })?;
            }
        }
        Ok(())
    }

    /// Drives the multi-domain scheduler forward to `end_time_ps`.
    pub fn run(&mut self, end_time_ps: u64) -> Result<(), CascadeError> {
        if self.phase == Phase::Construct {
            return Err(StructuralError::DynamicPortAllocation { name: "<sim>".to_string() }.into());
        }
        self.phase = Phase::Running;
        let scheduler = self.scheduler.as_mut().expect("resolve_and_schedule must run before run()");
        scheduler.run_simulation(end_time_ps, &self.fifos).map_err(|e| {
            self.fatal_hook.on_fatal(&e);
            CascadeError::from(e)
        })
    }

    fn structural_checksum(&self) -> u32 {
        let class_names: Vec<&str> = self.hierarchy.components.iter().map(|c| c.class_name.as_str()).collect();
        let child_ids: Vec<u16> = self.hierarchy.components.iter().map(|c| c.sibling_id).collect();
        let port_sizes: Vec<u16> = self.ports.iter().map(|p| p.info.size_bytes).collect();
        let fifo_sizes: Vec<u32> = self.fifos.iter().map(|(_, f, _)| f.full_count() + f.free_count()).collect();
        archive::compute_structural_checksum(&class_names, &child_ids, &port_sizes, &fifo_sizes)
    }

    /// Builds a full [`SimArchive`] of current runtime state.
    pub fn checkpoint(&self) -> Result<Vec<u8>, CascadeError> {
        let checksum = self.structural_checksum();
        let domains = self
            .scheduler
            .as_ref()
            .map(|s| {
                s.domains
                    .iter()
                    .map(|d| DomainArchive {
                        id: d.id,
                        period_ps: match d.schedule {
                            ClockSchedule::Period { period_ps } => period_ps,
                            ClockSchedule::Derived { generator_period_ps, .. } => generator_period_ps,
                        },
                        next_edge_ps: d.next_edge_ps,
                        sim_time_ps: d.sim_time_ps,
                        num_ticks: d.num_ticks,
                        ring_index: d.trigger_ring.index(),
                        ring_mask: d.trigger_ring.mask(),
                        trigger_ring_slots: d.trigger_ring.slots().to_vec(),
                        storage_bytes: d.storage_bytes().to_vec(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let fifos = self
            .fifos
            .iter()
            .map(|(name, f, _)| FifoArchive {
                name: name.clone(),
                head: f.head(),
                tail: f.tail(),
                full_count: f.full_count(),
                free_count: f.free_count(),
                data: f.buffer().to_vec(),
            })
            .collect();

        let components = self
            .component_paths
            .iter()
            .zip(self.components.iter())
            .map(|(path, c)| ComponentArchive { path: path.clone(), active: c.is_active(), user_state: c.archive() })
            .collect();

        let sim_time_ps = self.scheduler.as_ref().map(|s| s.domains.iter().map(|d| d.sim_time_ps).max().unwrap_or(0)).unwrap_or(0);
        let sim_ticks = self.scheduler.as_ref().map(|s| s.domains.iter().map(|d| d.num_ticks).max().unwrap_or(0)).unwrap_or(0);

        let pending_events = self
            .scheduler
            .as_ref()
            .map(|s| {
                s.domains
                    .iter()
                    .flat_map(|d| {
                        d.events.snapshot().into_iter().map(move |(fire_at_ps, type_id, callback_id, payload)| {
                            PendingEventArchive { domain_id: d.id, type_id, callback_id, fire_at_ps, payload }
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let snapshot = SimArchive {
            structural_checksum: checksum,
            sim_time_ps,
            sim_ticks,
            domains,
            fifos,
            pending_events,
            components,
            magic: END_OF_ARCHIVE_MAGIC,
        };
        archive::save(&snapshot)
    }

    /// Loads a [`SimArchive`] previously produced by [`Sim::checkpoint`],
    /// validating it against this simulator's current structural checksum
    /// before applying component state. A checksum mismatch is fatal.
    pub fn restore(&mut self, bytes: &[u8]) -> Result<(), CascadeError> {
        let expected = self.structural_checksum();
        let snapshot = archive::load(bytes, expected)?;
        for component_archive in &snapshot.components {
            if let Some(idx) = self.component_paths.iter().position(|p| p == &component_archive.path) {
                self.components[idx].restore(&component_archive.user_state);
            }
        }
        if let Some(scheduler) = &mut self.scheduler {
            for domain_archive in &snapshot.domains {
                if let Some(domain) = scheduler.domains.iter_mut().find(|d| d.id == domain_archive.id) {
                    domain.sim_time_ps = domain_archive.sim_time_ps;
                    domain.next_edge_ps = domain_archive.next_edge_ps;
                    domain.num_ticks = domain_archive.num_ticks;
                    domain.trigger_ring.restore(domain_archive.ring_index, domain_archive.trigger_ring_slots.clone());
                    domain.restore_storage_bytes(&domain_archive.storage_bytes);
                }
            }
            if let Some(factory) = &self.event_factory {
                for pending in &snapshot.pending_events {
                    if let Some(domain) = scheduler.domains.iter_mut().find(|d| d.id == pending.domain_id) {
                        if let Some(event) = factory.recreate(pending.type_id, pending.callback_id, &pending.payload) {
                            domain.events.schedule(pending.fire_at_ps, event);
                        }
                    }
                }
            }
        }
        for fifo_archive in &snapshot.fifos {
            if let Some((_, fifo, _)) = self.fifos.iter_mut().find(|(name, _, _)| name == &fifo_archive.name) {
                fifo.restore_state(
                    fifo_archive.head,
                    fifo_archive.tail,
                    fifo_archive.full_count,
                    fifo_archive.free_count,
                    &fifo_archive.data,
                );
            }
        }
        Ok(())
    }
}
