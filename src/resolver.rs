//! Net and Register Resolver.
//!
//! Runs exactly once after construction closes the [`PortGraph`], in three
//! ordered passes — FIFO resolution, net resolution, and register
//! resolution — followed by update-edge construction, each validating
//! and finalizing the graph it was handed by the previous pass.

use crate::error::ResolutionError;
use crate::ports::{PortConnection, PortDirection, PortGraph, PortId};
use rustc_hash::FxHashMap;

/// A strong or weak precedence constraint between two updates, produced by
/// [`build_update_edges`] and consumed by the scheduler.
#[derive(Debug, Clone, Copy)]
pub struct UpdateEdge {
    pub from: u32,
    pub to: u32,
    pub strong: bool,
    /// Weak-edge weight (the port's size in bytes); meaningless for strong edges.
    pub weight: u32,
    pub port: PortId,
}

/// Per-clock-domain period lookup used by FIFO capacity math.
#[derive(Debug, Default, Clone)]
pub struct ClockPeriods {
    pub period_ps: FxHashMap<u32, u64>,
}

impl ClockPeriods {
    pub fn period_of(&self, domain: u32) -> u64 {
        *self.period_ps.get(&domain).unwrap_or(&1)
    }
}

/// Minimum FIFO capacity to avoid bubbles.
///
/// `delay_cycles` is expressed in consumer-domain cycles, already summed
/// across the FIFO's segments and converted from picoseconds.
pub fn compute_fifo_min_capacity(delay_cycles: u32, consumer_period_ps: u64, producer_period_ps: u64, flow_control: bool) -> u32 {
    if producer_period_ps == 0 {
        return 1;
    }
    let ratio = (delay_cycles as u128 * consumer_period_ps as u128) / producer_period_ps as u128;
    let min = if flow_control { 2 * ratio + 1 } else { ratio + 1 };
    min.min(u32::MAX as u128) as u32
}

/// FIFO resolve: walks each FIFO chain from consumer to
/// producer, sizes its capacity, and reparents the producer wrapper under
/// the consumer.
pub fn resolve_fifos(graph: &mut PortGraph, periods: &ClockPeriods) -> Result<(), ResolutionError> {
    let ids: Vec<PortId> = graph.iter().map(|w| w.id).collect();
    for id in ids {
        let w = graph.get(id);
        if !matches!(w.direction, PortDirection::InFifo) {
            continue;
        }
        let Some(producer) = w.source else {
            if w.no_reader || w.no_writer {
                continue;
            }
            return Err(ResolutionError::FifoMissingEndpoint { name: w.name.clone() });
        };
        let delay_cycles = w.delay_cycles;
        let flow_control = !w.disable_flow_control;
        let consumer_period = periods.period_of(w.clock_domain);
        let producer_period = periods.period_of(graph.get(producer).clock_domain);
        let minimum = compute_fifo_min_capacity(delay_cycles, consumer_period, producer_period, flow_control);

        let requested = graph.get(id).fifo_size;
        let final_size = if requested == 0 {
            minimum
        } else if requested < minimum {
            if flow_control {
                minimum
            } else {
                return Err(ResolutionError::FifoBelowMinimum { name: graph.get(id).name.clone(), capacity: requested, minimum });
            }
        } else {
            requested
        };

        let (readers, triggers, no_reader) = {
            let w = graph.get(id);
            (w.readers.clone(), w.triggers.clone(), w.no_reader)
        };
        {
            let w = graph.get_mut(id);
            w.fifo_size = final_size;
        }
        {
            let p = graph.get_mut(producer);
            p.readers.extend(readers);
            p.triggers.extend(triggers);
            p.no_reader = no_reader;
        }
    }
    Ok(())
}

/// Net resolve: depth-first collapse of `Connected`
/// chains to their terminal, propagating `Constant` and reader/writer/
/// trigger lists as it goes. A cycle of pure `Connected` links (impossible
/// to terminate at a real terminal) is reported as an unreachable port.
pub fn resolve_nets(graph: &mut PortGraph) -> Result<(), ResolutionError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        White,
        Gray,
        Black,
    }

    let n = graph.len();
    let mut mark = vec![Mark::White; n];
    let mut terminal: Vec<Option<PortId>> = vec![None; n];

    fn resolve_one(
        idx: usize,
        graph: &mut PortGraph,
        mark: &mut [Mark],
        terminal: &mut [Option<PortId>],
    ) -> Result<PortId, ResolutionError> {
        if let Some(t) = terminal[idx] {
            return Ok(t);
        }
        if mark[idx] == Mark::Gray {
            return Err(ResolutionError::UnreachableTerminal { name: graph.get(PortId(idx as u32)).name.clone() });
        }
        mark[idx] = Mark::Gray;
        let id = PortId(idx as u32);
        let conn = graph.get(id).connection;
        let resolved = if conn == PortConnection::Connected {
            let src = graph
                .get(id)
                .source
                .ok_or_else(|| ResolutionError::UnreachableTerminal { name: graph.get(id).name.clone() })?;
            let t = resolve_one(src.0 as usize, graph, mark, terminal)?;
            if graph.get(t).connection == PortConnection::Constant {
                let const_value = graph.get(t).const_value;
                let w = graph.get_mut(id);
                w.connection = PortConnection::Constant;
                w.const_value = const_value;
            }
            let (readers, writers, triggers) = {
                let w = graph.get(id);
                (w.readers.clone(), w.writers.clone(), w.triggers.clone())
            };
            let tw = graph.get_mut(t);
            tw.readers.extend(readers);
            tw.writers.extend(writers);
            tw.triggers.extend(triggers);
            t
        } else {
            id
        };
        terminal[idx] = Some(resolved);
        mark[idx] = Mark::Black;
        Ok(resolved)
    }

    for idx in 0..n {
        resolve_one(idx, graph, &mut mark, &mut terminal)?;
    }
    Ok(())
}

/// Register resolve: composes a `Synchronous`
/// wrapper's delay with its source's delay when the source is itself
/// `Synchronous`, breaking any cycle by marking the closing wrapper
/// `Patched`.
pub fn resolve_registers(graph: &mut PortGraph) -> Result<(), ResolutionError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        White,
        Gray,
        Black,
    }
    let n = graph.len();
    let mut mark = vec![Mark::White; n];

    fn visit(idx: usize, graph: &mut PortGraph, mark: &mut [Mark]) {
        if mark[idx] == Mark::Black {
            return;
        }
        if mark[idx] == Mark::Gray {
            graph.get_mut(PortId(idx as u32)).connection = PortConnection::Patched;
            return;
        }
        let id = PortId(idx as u32);
        if graph.get(id).connection != PortConnection::Synchronous {
            mark[idx] = Mark::Black;
            return;
        }
        mark[idx] = Mark::Gray;
        if let Some(src) = graph.get(id).source {
            visit(src.0 as usize, graph, mark);
            if graph.get(src).connection == PortConnection::Synchronous {
                let src_delay = graph.get(src).delay_cycles;
                graph.get_mut(id).delay_cycles += src_delay;
            }
        }
        mark[idx] = Mark::Black;
    }

    for idx in 0..n {
        visit(idx, graph, &mut mark);
    }
    Ok(())
}

/// Update edges: strong edges for same-cycle
/// writer-before-reader on a zero-delay terminal, weak edges (weighted by
/// port size) for a 1-cycle register's writer-before-reader ordering
/// preference.
pub fn build_update_edges(graph: &PortGraph) -> Vec<UpdateEdge> {
    let mut edges = Vec::new();
    for w in graph.iter() {
        if w.writers.is_empty() || w.readers.is_empty() {
            continue;
        }
        let strong = w.delay_cycles == 0
            && matches!(w.connection, PortConnection::Connected | PortConnection::Constant | PortConnection::Wired);
        let weak_eligible = w.delay_cycles == 1
            && w.connection == PortConnection::Synchronous
            && !w.no_fake_register
            && !w.external_binding;

        if !strong && !weak_eligible {
            continue;
        }
        for &writer in &w.writers {
            for &reader in &w.readers {
                edges.push(UpdateEdge {
                    from: writer,
                    to: reader,
                    strong,
                    weight: w.info.size_bytes as u32,
                    port: w.id,
                });
            }
        }
    }
    edges
}

/// Fake-register elimination: given the final
/// topological `order` (post-sort index per update), a 1-cycle register
/// whose readers all precede its writers in that order can be eliminated:
/// the reader reads the writer's own storage one cycle after the write.
/// Returns the set of [`PortId`]s eliminated.
pub fn fake_register_optimization(graph: &mut PortGraph, order: &FxHashMap<u32, u32>) -> Vec<PortId> {
    let mut eliminated = Vec::new();
    let ids: Vec<PortId> = graph.iter().map(|w| w.id).collect();
    for id in ids {
        let w = graph.get(id);
        if w.delay_cycles != 1 || w.connection != PortConnection::Synchronous || w.no_fake_register || w.external_binding {
            continue;
        }
        if w.readers.is_empty() || w.writers.is_empty() {
            continue;
        }
        let max_reader_pos = w.readers.iter().filter_map(|r| order.get(r)).max().copied();
        let min_writer_pos = w.writers.iter().filter_map(|r| order.get(r)).min().copied();
        let (Some(max_reader_pos), Some(min_writer_pos)) = (max_reader_pos, min_writer_pos) else {
            continue;
        };
        if max_reader_pos < min_writer_pos {
            graph.get_mut(id).connection = PortConnection::Patched;
            eliminated.push(id);
        }
    }
    eliminated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::PortInfo;

    fn declare(graph: &mut PortGraph, name: &str, dir: PortDirection) -> PortId {
        graph.declare(name, "Top", dir, PortInfo::new(4, 32, true, "u32"), 0).unwrap()
    }

    #[test]
    fn fifo_capacity_with_flow_control_doubles_delay_term() {
        let with = compute_fifo_min_capacity(3, 10, 10, true);
        let without = compute_fifo_min_capacity(3, 10, 10, false);
        assert_eq!(with, 7);
        assert_eq!(without, 4);
    }

    #[test]
    fn net_resolve_collapses_chain_to_terminal() {
        let mut g = PortGraph::new();
        let a = declare(&mut g, "a", PortDirection::Output);
        let b = declare(&mut g, "b", PortDirection::Input);
        let c = declare(&mut g, "c", PortDirection::Input);
        g.connect(b, a, 0).unwrap();
        g.connect(c, b, 0).unwrap();
        resolve_nets(&mut g).unwrap();
        assert_eq!(g.get(c).connection, PortConnection::Connected);
    }

    #[test]
    fn net_resolve_detects_cycle() {
        let mut g = PortGraph::new();
        let a = declare(&mut g, "a", PortDirection::Input);
        let b = declare(&mut g, "b", PortDirection::Input);
        g.get_mut(a).source = Some(b);
        g.get_mut(a).connection = PortConnection::Connected;
        g.get_mut(b).source = Some(a);
        g.get_mut(b).connection = PortConnection::Connected;
        assert!(resolve_nets(&mut g).is_err());
    }

    #[test]
    fn register_resolve_composes_chained_delay() {
        let mut g = PortGraph::new();
        let a = declare(&mut g, "a", PortDirection::Register);
        let b = declare(&mut g, "b", PortDirection::Register);
        g.connect(a, declare(&mut g, "src", PortDirection::Output), 2).unwrap();
        g.connect(b, a, 1).unwrap();
        resolve_registers(&mut g).unwrap();
        assert_eq!(g.get(b).delay_cycles, 3);
    }

    #[test]
    fn strong_edge_built_for_zero_delay_connected_port() {
        let mut g = PortGraph::new();
        let a = declare(&mut g, "a", PortDirection::Output);
        let b = declare(&mut g, "b", PortDirection::Input);
        g.connect(b, a, 0).unwrap();
        g.get_mut(b).writers.push(7);
        g.get_mut(b).readers.push(9);
        let edges = build_update_edges(&g);
        assert!(edges.iter().any(|e| e.from == 7 && e.to == 9 && e.strong));
    }

    #[test]
    fn fake_register_eliminated_when_readers_precede_writers() {
        let mut g = PortGraph::new();
        let src = declare(&mut g, "src", PortDirection::Output);
        let reg = declare(&mut g, "reg", PortDirection::Register);
        g.connect(reg, src, 1).unwrap();
        g.get_mut(reg).writers.push(10);
        g.get_mut(reg).readers.push(20);
        let mut order = FxHashMap::default();
        order.insert(10u32, 5u32);
        order.insert(20u32, 1u32);
        let eliminated = fake_register_optimization(&mut g, &order);
        assert_eq!(eliminated, vec![reg]);
        assert_eq!(g.get(reg).connection, PortConnection::Patched);
    }

    #[test]
    fn fake_register_kept_when_external_binding_set() {
        let mut g = PortGraph::new();
        let src = declare(&mut g, "src", PortDirection::Output);
        let reg = declare(&mut g, "reg", PortDirection::Register);
        g.connect(reg, src, 1).unwrap();
        g.get_mut(reg).external_binding = true;
        g.get_mut(reg).writers.push(10);
        g.get_mut(reg).readers.push(20);
        let mut order = FxHashMap::default();
        order.insert(10u32, 5u32);
        order.insert(20u32, 1u32);
        let eliminated = fake_register_optimization(&mut g, &order);
        assert!(eliminated.is_empty());
    }
}
