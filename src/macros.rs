// Declarative construction helpers for port graphs, update byte-streams,
// and component hierarchies. Generated code calls straight into
// `ports::PortGraph`/`hierarchy::Hierarchy`/`clockdomain::UpdateEntry`; the
// macros exist so a component's port list reads as a flat declaration
// instead of a sequence of imperative `declare`/`connect` calls.

/// Declares a block of ports on `$graph` for `$class` in one shot.
///
/// ```ignore
/// declare_ports! {
///     graph, "Adder", domain: 0,
///     in  a: Register[4] = PortInfo::new(4, 32, true, "u32"),
///     in  b: Register[4] = PortInfo::new(4, 32, true, "u32"),
///     out sum: Output[4] = PortInfo::new(4, 32, true, "u32"),
/// }
/// ```
#[macro_export]
macro_rules! declare_ports {
    (
        $graph:expr, $class:expr, domain: $domain:expr,
        $($dir:ident $name:ident : $kind:ident [$delay:expr] = $info:expr),* $(,)?
    ) => {{
        let mut ids = ::std::collections::HashMap::new();
        $(
            let id = $graph.declare(
                stringify!($name),
                $class,
                $crate::ports::PortDirection::$kind,
                $info,
                $domain,
            )?;
            $graph.set_delay(id, $delay)?;
            let _ = $crate::macros::assert_direction(stringify!($dir));
            ids.insert(stringify!($name), id);
        )*
        ids
    }};
}

#[doc(hidden)]
pub fn assert_direction(dir: &str) -> bool {
    matches!(dir, "in" | "out" | "inout")
}

/// Wires one port to a source, panicking at declare-site if the direction
/// implied by the arrow is nonsensical (`<-` always reads right-to-left:
/// destination then source), mirroring `PortGraph::connect`'s own argument
/// order so the macro cannot silently swap them.
#[macro_export]
macro_rules! wire {
    ($graph:expr, $dst:expr => $src:expr, delay: $delay:expr) => {
        $graph.connect($dst, $src, $delay)
    };
    ($graph:expr, $dst:expr => $src:expr) => {
        $graph.connect($dst, $src, 0)
    };
}

/// Builds an [`crate::clockdomain::UpdateEntry`] from a name, an activity
/// flag, and a closure over the domain's raw byte storage — the
/// declarative form of what `ClockDomain::updates.push(..)` would
/// otherwise spell out by hand for every combinational block.
#[macro_export]
macro_rules! define_update {
    (
        name: $name:expr,
        active: $active:expr,
        triggers: [$($trigger:expr),* $(,)?],
        run: $run:expr
    ) => {
        $crate::clockdomain::UpdateEntry {
            name: $name.to_string(),
            component_active: true,
            default_active: $active,
            input_triggers: vec![$($trigger),*],
            run: Box::new($run),
            trailing_triggers: Vec::new(),
        }
    };
}

/// Registers a component class's interface entries against the current
/// construction frame, mirroring the repeated `Hierarchy::record_entry`
/// calls a hand-written `build(cx)` function would make for each port or
/// sub-interface field.
#[macro_export]
macro_rules! define_component_class {
    ($hierarchy:expr, $frame:expr, entries: [$($entry:expr),* $(,)?]) => {
        (|| -> Result<(), $crate::error::StructuralError> {
            $(
                $hierarchy.record_entry($frame, $entry)?;
            )*
            Ok(())
        })()
    };
}

/// Assertion that a FIFO capacity is at least the minimum required for
/// the given delay and consumer/producer clock periods, catching an
/// under-sized hand-authored FIFO before it ever runs.
#[macro_export]
macro_rules! assert_fifo_capacity {
    ($capacity:expr, $delay:expr, consumer_period_ps: $cp:expr, producer_period_ps: $pp:expr, flow_control: $flow:expr) => {
        assert!(
            $capacity >= $crate::resolver::compute_fifo_min_capacity($delay, $cp, $pp, $flow),
            "FIFO capacity {} below computed minimum for delay {} at period ratio {}/{}",
            $capacity,
            $delay,
            $cp,
            $pp
        );
    };
}

#[cfg(test)]
mod tests {
    use crate::hierarchy::Hierarchy;
    use crate::ports::{PortDirection, PortGraph, PortInfo};

    #[test]
    fn declare_ports_macro_inserts_every_named_port() {
        let mut graph = PortGraph::new();
        let ids: Result<_, crate::error::StructuralError> = (|| {
            Ok(declare_ports! {
                graph, "Adder", domain: 0,
                in a: Register[0] = PortInfo::new(4, 32, true, "u32"),
                in b: Register[0] = PortInfo::new(4, 32, true, "u32"),
                out sum: Output[0] = PortInfo::new(4, 32, true, "u32"),
            })
        })();
        let ids = ids.unwrap();
        assert_eq!(ids.len(), 3);
        assert!(ids.contains_key("a"));
        assert!(ids.contains_key("sum"));
    }

    #[test]
    fn wire_macro_connects_destination_to_source() {
        let mut graph = PortGraph::new();
        let a = graph
            .declare("a", "Top", PortDirection::Output, PortInfo::new(4, 32, true, "u32"), 0)
            .unwrap();
        let b = graph
            .declare("b", "Top", PortDirection::Input, PortInfo::new(4, 32, true, "u32"), 0)
            .unwrap();
        wire!(graph, b => a).unwrap();
        assert_eq!(graph.get(b).source, Some(a));
    }

    #[test]
    fn define_update_macro_builds_entry_with_given_name() {
        let entry = define_update! {
            name: "adder.sum",
            active: true,
            triggers: [],
            run: |_bytes: &mut [u8]| {}
        };
        assert_eq!(entry.name, "adder.sum");
        assert!(entry.default_active);
    }

    #[test]
    fn define_component_class_registers_every_entry() {
        let mut h = Hierarchy::new();
        let desc_id = h.add_descriptor("Adder");
        let mut stack = crate::hierarchy::ConstructStack::default();
        stack.push(desc_id, false);
        let frame = stack.current_mut().unwrap();
        define_component_class!(
            h,
            frame,
            entries: [
                crate::hierarchy::InterfaceEntry {
                    offset: 0,
                    direction: PortDirection::Input,
                    is_array: false,
                    is_base_class: false,
                    stride: 0,
                    kind: crate::hierarchy::EntryKind::Port(PortInfo::new(4, 32, true, "u32")),
                },
                crate::hierarchy::InterfaceEntry {
                    offset: 4,
                    direction: PortDirection::Input,
                    is_array: false,
                    is_base_class: false,
                    stride: 0,
                    kind: crate::hierarchy::EntryKind::Port(PortInfo::new(4, 32, true, "u32")),
                },
            ]
        )
        .unwrap();
        assert_eq!(h.descriptor(desc_id).entries.len(), 2);
    }

    #[test]
    fn assert_fifo_capacity_passes_for_sufficient_size() {
        assert_fifo_capacity!(16, 2, consumer_period_ps: 1, producer_period_ps: 1, flow_control: true);
    }

    #[test]
    #[should_panic]
    fn assert_fifo_capacity_panics_for_undersized_fifo() {
        assert_fifo_capacity!(1, 8, consumer_period_ps: 1, producer_period_ps: 1, flow_control: true);
    }
}
