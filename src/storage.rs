//! Port Storage Planner.
//!
//! Lays out one clock domain's terminal port values into delay-indexed
//! regions sized so a single memcpy per depth advances an entire register
//! pipeline stage on every rising edge. Regions are keyed by
//! `(kind, delay)` and packed as 4-byte-aligned, size-prefixed blocks so
//! the layout stays cache-friendly regardless of how many delay depths a
//! domain uses.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::ports::{PortConnection, PortGraph, PortId, PortType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Kind {
    Normal,
    Latch,
    Pulse,
}

fn kind_of(port_type: PortType) -> Kind {
    match port_type {
        PortType::Normal => Kind::Normal,
        PortType::Latch => Kind::Latch,
        PortType::Pulse => Kind::Pulse,
    }
}

/// One `(kind, delay)` region: a 4-byte-aligned block with a 2-byte size
/// field, 2-byte count, and padded value bytes — with a 1-byte flag prefix
/// per value in debug builds.
#[derive(Debug, Clone)]
pub struct Region {
    pub kind: Kind,
    pub delay: u32,
    pub header_offset: usize,
    pub value_size_bytes: u16,
    pub count: u16,
    pub value_offsets: Vec<usize>,
    pub span_start: usize,
    pub span_end: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct MemcpyOp {
    pub src_offset: usize,
    pub dst_offset: usize,
    pub len: usize,
}

/// A patched/slow register copy whose source lives in a different clock
/// domain. Built once every domain has allocated its own
/// [`PortStoragePlan`], since the source offset isn't known until then;
/// executed by [`crate::multidomain::MultiDomainScheduler`], the only
/// place that can see two domains' storage at once.
#[derive(Debug, Clone, Copy)]
pub struct CrossDomainCopy {
    pub src_domain_idx: usize,
    pub dst_domain_idx: usize,
    pub src_offset: usize,
    pub dst_offset: usize,
    pub len: usize,
}

/// Scans the fully-planned graph for `Patched`/`Slow` wrappers whose
/// source lives in a domain other than their own and builds the
/// cross-domain copy list, keyed to each domain's position in `domains`
/// (matched by [`crate::clockdomain::ClockDomain::id`]).
pub fn plan_cross_domain_copies(
    graph: &PortGraph,
    domains: &[crate::clockdomain::ClockDomain],
) -> (Vec<CrossDomainCopy>, Vec<CrossDomainCopy>) {
    let mut pre_tick = Vec::new();
    let mut tick_side = Vec::new();
    for w in graph.iter() {
        if !matches!(w.connection, PortConnection::Patched | PortConnection::Slow) {
            continue;
        }
        let Some(src) = w.source else { continue };
        let src_domain = graph.get(src).clock_domain;
        if src_domain == w.clock_domain {
            continue;
        }
        let Some(dst_domain_idx) = domains.iter().position(|d| d.id == w.clock_domain) else { continue };
        let Some(src_domain_idx) = domains.iter().position(|d| d.id == src_domain) else { continue };
        let Some(&dst_offset) = domains[dst_domain_idx].storage.port_offset.get(&w.id) else { continue };
        let Some(&src_offset) = domains[src_domain_idx].storage.port_offset.get(&src) else { continue };
        let op = CrossDomainCopy { src_domain_idx, dst_domain_idx, src_offset, dst_offset, len: w.info.size_bytes as usize };
        if w.connection == PortConnection::Patched {
            pre_tick.push(op);
        } else {
            tick_side.push(op);
        }
    }
    (pre_tick, tick_side)
}

/// The three memcpy plans executed, in order, every tick.
#[derive(Debug, Default)]
pub struct PortStoragePlan {
    pub total_bytes: usize,
    pub regions: Vec<Region>,
    /// Level-0 value offset for each terminal port, the address readers
    /// and writers ultimately index into.
    pub port_offset: FxHashMap<PortId, usize>,
    pub max_delay: u32,
    /// Phase 1: patched-register temporaries, executed pre-tick.
    pub pre_tick: Vec<MemcpyOp>,
    /// Phase 2: deepest-first bulk shifts of the N/L pipelines, plus
    /// per-value copies for wired terminals and slow cross-domain
    /// registers, executed at tick.
    pub tick_shift: Vec<MemcpyOp>,
    pub tick_side_copies: Vec<MemcpyOp>,
    /// Phase 3, post-tick: whether N-class values get invalidated
    /// (debug builds only) and the single span to zero for pulse ports.
    pub invalidate_normal_debug: bool,
    pub pulse_zero_span: Option<(usize, usize)>,
}

fn align4(n: usize) -> usize {
    (n + 3) & !3
}

/// Plans storage for every non-`Connected` wrapper in `domain` (a
/// `Connected` wrapper is a pure alias collapsed by the resolver and owns
/// no storage of its own).
pub fn plan_domain_storage(graph: &PortGraph, domain: u32, debug_validity: bool) -> PortStoragePlan {
    let mut by_key: BTreeMap<(Kind, u32), Vec<PortId>> = BTreeMap::new();
    for w in graph.iter() {
        if w.clock_domain != domain || w.connection == PortConnection::Connected {
            continue;
        }
        let key = (kind_of(w.port_type), w.delay_cycles);
        by_key.entry(key).or_default().push(w.id);
    }

    let mut nl_keys: Vec<(Kind, u32)> = by_key.keys().filter(|(k, _)| *k != Kind::Pulse).copied().collect();
    nl_keys.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    let mut p_keys: Vec<(Kind, u32)> = by_key.keys().filter(|(k, _)| *k == Kind::Pulse).copied().collect();
    p_keys.sort_by(|a, b| a.1.cmp(&b.1));

    let flag_bytes: usize = if debug_validity { 1 } else { 0 };
    let mut regions = Vec::new();
    let mut offset = 0usize;
    let mut port_offset = FxHashMap::default();
    let mut max_delay = 0u32;
    let mut pulse_span: Option<(usize, usize)> = None;

    for key in nl_keys.into_iter().chain(p_keys.into_iter()) {
        let (kind, delay) = key;
        let ids = &by_key[&key];
        max_delay = max_delay.max(delay);

        let value_size_bytes = ids.iter().map(|id| graph.get(*id).info.size_bytes).max().unwrap_or(0);
        offset = align4(offset);
        let header_offset = offset;
        offset += 4; // 2-byte size field + 2-byte count

        let span_start = offset;
        for &id in ids {
            offset += flag_bytes;
            port_offset.insert(id, offset);
            offset += value_size_bytes as usize;
        }
        let span_end = offset;
        offset = align4(offset);

        if kind == Kind::Pulse {
            pulse_span = Some(match pulse_span {
                Some((s, _)) => (s, span_end),
                None => (span_start, span_end),
            });
        }

        regions.push(Region {
            kind,
            delay,
            header_offset,
            value_size_bytes,
            count: ids.len() as u16,
            value_offsets: ids.iter().map(|id| port_offset[id]).collect(),
            span_start,
            span_end,
        });
    }

    let mut plan = PortStoragePlan {
        total_bytes: offset,
        port_offset,
        max_delay,
        invalidate_normal_debug: debug_validity,
        pulse_zero_span: pulse_span,
        ..Default::default()
    };

    // Phase 2: deepest-first per-port shifts for N and L pipelines. A
    // region can hold several unrelated ports at the same (kind, delay), so
    // the copy is keyed by each port's own `source` rather than by region
    // span — a bulk span-to-span copy would scramble values whenever two
    // ports share a region. Processing strictly deepest-first guarantees a
    // port is only overwritten after everything reading its old value this
    // tick has already copied it out.
    let mut nl_ports: Vec<PortId> = by_key
        .iter()
        .filter(|((kind, _), _)| *kind != Kind::Pulse)
        .flat_map(|(_, ids)| ids.iter().copied())
        .collect();
    nl_ports.sort_by(|a, b| graph.get(*b).delay_cycles.cmp(&graph.get(*a).delay_cycles));
    for id in nl_ports {
        let w = graph.get(id);
        if w.delay_cycles == 0 || w.connection != PortConnection::Synchronous {
            continue;
        }
        let Some(src) = w.source else { continue };
        if graph.get(src).clock_domain != domain {
            // Bridged across domains by the multi-domain scheduler once
            // every domain has allocated its own storage.
            continue;
        }
        let Some(&dst_offset) = plan.port_offset.get(&id) else { continue };
        let Some(&src_offset) = plan.port_offset.get(&src) else { continue };
        plan.tick_shift.push(MemcpyOp { src_offset, dst_offset, len: w.info.size_bytes as usize });
    }

    // Phase 1 / side copies: patched-register temporaries precede the tick;
    // wired and slow cross-domain registers are copied alongside the shift.
    for w in graph.iter() {
        if w.clock_domain != domain {
            continue;
        }
        let Some(&dst_offset) = plan.port_offset.get(&w.id) else { continue };
        let len = w.info.size_bytes as usize;
        match w.connection {
            PortConnection::Patched => {
                if let Some(src) = w.source {
                    if let Some(&src_offset) = plan.port_offset.get(&src) {
                        plan.pre_tick.push(MemcpyOp { src_offset, dst_offset, len });
                    }
                }
            }
            PortConnection::Wired | PortConnection::Slow => {
                if let Some(src) = w.source {
                    if let Some(&src_offset) = plan.port_offset.get(&src) {
                        plan.tick_side_copies.push(MemcpyOp { src_offset, dst_offset, len });
                    }
                }
            }
            _ => {}
        }
    }

    plan.regions = regions;
    plan
}
