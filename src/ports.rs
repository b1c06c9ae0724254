//! Port Wrapper Graph.
//!
//! Every declared port becomes a [`PortWrapper`] pushed onto a
//! [`PortGraph`]; connection operators are only legal while that graph is
//! open for construction (`PortGraph::finish` closes it, handing off to
//! the resolver).

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::const_pool::{ConstId, ConstantPool};
use crate::error::StructuralError;

/// Maximum port size in bits.
pub const MAX_PORT_BITS: u32 = 8191;
/// Maximum port delay in cycles.
pub const MAX_PORT_DELAY_CYCLES: u32 = 16383;
/// Maximum fifo size in bytes.
pub const MAX_FIFO_SIZE_BYTES: u32 = 65535;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDirection {
    Input,
    Output,
    InOut,
    Register,
    InFifo,
    OutFifo,
    Temp,
    Clock,
    Reset,
    Signal,
}

/// Visual/update behaviour of a terminal port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortType {
    Normal,
    Latch,
    Pulse,
}

/// How a wrapper resolves to a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortConnection {
    Unconnected,
    Constant,
    Wired,
    Connected,
    Synchronous,
    /// Cross-clock-domain register connection with no patch wrapper.
    Slow,
    /// Patch wrapper inserted by the resolver to break a cross-domain or
    /// cyclic synchronous chain.
    Patched,
}

/// C↔wire bit-mapping function pair.
///
/// `map_c_to_v` packs a little-endian C-side byte buffer into wire words,
/// masking unused high bits to zero; `map_v_to_c` unpacks wire words back
/// into a C-side buffer, sign-extending if the port type is signed.
#[derive(Clone)]
pub struct BitmapFns {
    pub map_c_to_v: fn(write_words: &mut [u32], src_bytes: &[u8]),
    pub map_v_to_c: fn(dst_bytes: &mut [u8], read_words: &[u32]),
}

impl std::fmt::Debug for BitmapFns {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitmapFns").finish_non_exhaustive()
    }
}

fn identity_c_to_v(write_words: &mut [u32], src_bytes: &[u8]) {
    for (word, chunk) in write_words.iter_mut().zip(src_bytes.chunks(4)) {
        let mut buf = [0u8; 4];
        buf[..chunk.len()].copy_from_slice(chunk);
        *word = u32::from_le_bytes(buf);
    }
}

fn identity_v_to_c(dst_bytes: &mut [u8], read_words: &[u32]) {
    for (chunk, word) in dst_bytes.chunks_mut(4).zip(read_words.iter()) {
        let bytes = word.to_le_bytes();
        chunk.copy_from_slice(&bytes[..chunk.len()]);
    }
}

/// Static, value-held-by-value port metadata.
#[derive(Debug, Clone)]
pub struct PortInfo {
    pub size_bytes: u16,
    pub size_bits: u16,
    pub exact_size: bool,
    pub bitmap: Option<BitmapFns>,
    pub type_name: &'static str,
    pub signed: bool,
}

impl PortInfo {
    pub fn new(size_bytes: u16, size_bits: u16, exact_size: bool, type_name: &'static str) -> Self {
        Self { size_bytes, size_bits, exact_size, bitmap: None, type_name, signed: false }
    }

    pub fn with_default_bitmap(mut self) -> Self {
        self.bitmap = Some(BitmapFns { map_c_to_v: identity_c_to_v, map_v_to_c: identity_v_to_c });
        self
    }

    pub fn signed(mut self) -> Self {
        self.signed = true;
        self
    }
}

/// A tag carried alongside a trigger: either an active-level flag or a
/// callback pointer with the tag bit set in the low bit.
#[derive(Debug, Clone, Copy)]
pub enum TriggerSpec {
    Level { active_high: bool },
    Callback { token: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortId(pub u32);

/// One declared port.
#[derive(Debug)]
pub struct PortWrapper {
    pub id: PortId,
    pub name: String,
    pub component_path: String,
    pub direction: PortDirection,
    pub info: PortInfo,
    pub port_type: PortType,
    pub connection: PortConnection,
    pub read_only: bool,
    pub no_reader: bool,
    pub no_writer: bool,
    pub disable_flow_control: bool,
    pub producer_bound: bool,
    pub external_binding: bool,
    /// Refuses fake-register elimination even when the sort would permit
    /// it; set automatically whenever `external_binding` is set, since an
    /// externally-bound writer's effective scheduling order is unknown.
    pub no_fake_register: bool,
    pub delay_cycles: u32,
    pub fifo_size: u32,
    pub readers: Vec<u32>,
    pub writers: Vec<u32>,
    pub triggers: Vec<TriggerSpec>,
    pub source: Option<PortId>,
    pub const_value: Option<ConstId>,
    pub clock_domain: u32,
}

impl PortWrapper {
    fn new(id: PortId, name: String, component_path: String, direction: PortDirection, info: PortInfo, clock_domain: u32) -> Self {
        Self {
            id,
            name,
            component_path,
            direction,
            info,
            port_type: PortType::Normal,
            connection: PortConnection::Unconnected,
            read_only: false,
            no_reader: false,
            no_writer: false,
            disable_flow_control: false,
            producer_bound: false,
            external_binding: false,
            no_fake_register: false,
            delay_cycles: 0,
            fifo_size: 0,
            readers: Vec::new(),
            writers: Vec::new(),
            triggers: Vec::new(),
            source: None,
            const_value: None,
            clock_domain,
        }
    }

    fn is_fifo(&self) -> bool {
        matches!(self.direction, PortDirection::InFifo | PortDirection::OutFifo)
    }

    /// `parent.childClassName[id].portName`, falling back to a positional
    /// index when `exact_port_names` is off and the field name is
    /// ambiguous.
    pub fn display_name(&self, exact_port_names: bool) -> String {
        if exact_port_names || !self.name.is_empty() {
            format!("{}.{}", self.component_path, self.name)
        } else {
            format!("{}.port{}", self.component_path, self.id.0)
        }
    }
}

/// Construction-time graph of all declared ports. Connection operators are
/// only valid while `closed == false`, i.e. during the Construct phase.
#[derive(Default)]
pub struct PortGraph {
    wrappers: Vec<PortWrapper>,
    closed: bool,
}

impl PortGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(
        &mut self,
        name: impl Into<String>,
        component_path: impl Into<String>,
        direction: PortDirection,
        info: PortInfo,
        clock_domain: u32,
    ) -> Result<PortId, StructuralError> {
        if self.closed {
            return Err(StructuralError::DynamicPortAllocation { name: name.into() });
        }
        let id = PortId(self.wrappers.len() as u32);
        self.wrappers.push(PortWrapper::new(id, name.into(), component_path.into(), direction, info, clock_domain));
        Ok(id)
    }

    pub fn get(&self, id: PortId) -> &PortWrapper {
        &self.wrappers[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: PortId) -> &mut PortWrapper {
        &mut self.wrappers[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.wrappers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wrappers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PortWrapper> {
        self.wrappers.iter()
    }

    /// Closes construction; connection operators become illegal afterward.
    pub fn finish(&mut self) {
        self.closed = true;
    }

    fn fail_if_closed(&self, name: &str) -> Result<(), StructuralError> {
        if self.closed {
            return Err(StructuralError::DynamicPortAllocation { name: name.to_string() });
        }
        Ok(())
    }

    /// `connect(a, b, delay)`: validates and links `a` (destination) to `b`
    /// (source).
    pub fn connect(&mut self, dest: PortId, src: PortId, delay_cycles: u32) -> Result<(), StructuralError> {
        self.fail_if_closed("connect")?;
        if dest == src {
            return Err(StructuralError::IllegalConnection {
                from: self.get(src).name.clone(),
                to: self.get(dest).name.clone(),
                reason: "self connection".to_string(),
            });
        }
        {
            let (d, s) = (self.get(dest), self.get(src));
            if d.info.size_bytes != s.info.size_bytes {
                return Err(StructuralError::SizeMismatch { name: d.name.clone(), a: d.info.size_bytes, b: s.info.size_bytes });
            }
            if d.is_fifo() != s.is_fifo() {
                return Err(StructuralError::IllegalConnection {
                    from: s.name.clone(),
                    to: d.name.clone(),
                    reason: "fifo ports connect only to fifo ports".to_string(),
                });
            }
            if matches!(d.direction, PortDirection::InOut) && !matches!(s.direction, PortDirection::InOut) {
                return Err(StructuralError::IllegalConnection {
                    from: s.name.clone(),
                    to: d.name.clone(),
                    reason: "inout connects only to inout".to_string(),
                });
            }
            if d.connection != PortConnection::Unconnected && !matches!(d.direction, PortDirection::InOut) {
                return Err(StructuralError::IllegalConnection {
                    from: s.name.clone(),
                    to: d.name.clone(),
                    reason: "destination is already connected".to_string(),
                });
            }
            if d.read_only {
                return Err(StructuralError::IllegalConnection {
                    from: s.name.clone(),
                    to: d.name.clone(),
                    reason: "destination is read-only".to_string(),
                });
            }
            if delay_cycles >= MAX_PORT_DELAY_CYCLES {
                return Err(StructuralError::IllegalConnection {
                    from: s.name.clone(),
                    to: d.name.clone(),
                    reason: format!("delay {delay_cycles} exceeds maximum"),
                });
            }
        }
        let dst = self.get_mut(dest);
        dst.source = Some(src);
        dst.delay_cycles = delay_cycles;
        dst.connection = if delay_cycles == 0 { PortConnection::Connected } else { PortConnection::Synchronous };
        let writer_id = src.0;
        self.get_mut(dest).writers.push(writer_id);
        Ok(())
    }

    /// `wireTo(&var)`: marks `port` as aliasing external storage, read-only.
    pub fn wire_to(&mut self, port: PortId) -> Result<(), StructuralError> {
        self.fail_if_closed("wireTo")?;
        let p = self.get_mut(port);
        p.connection = PortConnection::Wired;
        p.read_only = true;
        Ok(())
    }

    /// `wireToConst(v)`: interns `bytes` and marks `port` read-only-constant.
    pub fn wire_to_const(&mut self, port: PortId, pool: &mut ConstantPool, bytes: &[u8]) -> Result<(), StructuralError> {
        self.fail_if_closed("wireToConst")?;
        let id = pool.intern(bytes);
        let p = self.get_mut(port);
        p.connection = PortConnection::Constant;
        p.read_only = true;
        p.const_value = Some(id);
        Ok(())
    }

    /// May upgrade a `Connected` link to `Synchronous`.
    pub fn set_delay(&mut self, port: PortId, delay_cycles: u32) -> Result<(), StructuralError> {
        self.fail_if_closed("setDelay")?;
        let p = self.get_mut(port);
        if delay_cycles >= MAX_PORT_DELAY_CYCLES {
            return Err(StructuralError::IllegalConnection {
                from: p.name.clone(),
                to: p.name.clone(),
                reason: format!("delay {delay_cycles} exceeds maximum"),
            });
        }
        p.delay_cycles = delay_cycles;
        if delay_cycles > 0 && p.connection == PortConnection::Connected {
            p.connection = PortConnection::Synchronous;
        }
        Ok(())
    }

    pub fn set_type(&mut self, port: PortId, port_type: PortType) -> Result<(), StructuralError> {
        self.fail_if_closed("setType")?;
        self.get_mut(port).port_type = port_type;
        Ok(())
    }

    pub fn add_trigger(&mut self, port: PortId, spec: TriggerSpec) -> Result<(), StructuralError> {
        self.fail_if_closed("addTrigger")?;
        self.get_mut(port).triggers.push(spec);
        Ok(())
    }

    pub fn set_fifo_size(&mut self, port: PortId, size_bytes: u32) -> Result<(), StructuralError> {
        self.fail_if_closed("setFifoSize")?;
        if size_bytes >= MAX_FIFO_SIZE_BYTES {
            return Err(StructuralError::IllegalConnection {
                from: self.get(port).name.clone(),
                to: self.get(port).name.clone(),
                reason: format!("fifo size {size_bytes} exceeds maximum"),
            });
        }
        self.get_mut(port).fifo_size = size_bytes;
        Ok(())
    }

    /// Validates the closed-graph invariants that are cheap to check
    /// without the resolver's reachability pass: single producer,
    /// read-only ports have no writers, delay and fifo-size limits.
    pub fn validate(&self) -> Result<(), StructuralError> {
        for w in &self.wrappers {
            if w.read_only && !w.writers.is_empty() {
                return Err(StructuralError::IllegalConnection {
                    from: w.name.clone(),
                    to: w.name.clone(),
                    reason: "read-only wrapper has writers".to_string(),
                });
            }
            if w.delay_cycles >= MAX_PORT_DELAY_CYCLES {
                return Err(StructuralError::IllegalConnection {
                    from: w.name.clone(),
                    to: w.name.clone(),
                    reason: "delay exceeds maximum".to_string(),
                });
            }
            if w.is_fifo() && w.fifo_size >= MAX_FIFO_SIZE_BYTES {
                return Err(StructuralError::IllegalConnection {
                    from: w.name.clone(),
                    to: w.name.clone(),
                    reason: "fifo size exceeds maximum".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Quick per-clock-domain grouping helper used by the resolver and storage
/// planner (not itself part of construction).
pub fn group_by_domain(graph: &PortGraph) -> FxHashMap<u32, Vec<PortId>> {
    let mut map: FxHashMap<u32, Vec<PortId>> = FxHashMap::default();
    for w in graph.iter() {
        map.entry(w.clock_domain).or_default().push(w.id);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declare_u32(graph: &mut PortGraph, name: &str, dir: PortDirection) -> PortId {
        graph.declare(name, "Top", dir, PortInfo::new(4, 32, true, "u32"), 0).unwrap()
    }

    #[test]
    fn connect_links_destination_to_source() {
        let mut g = PortGraph::new();
        let a = declare_u32(&mut g, "a", PortDirection::Output);
        let b = declare_u32(&mut g, "b", PortDirection::Input);
        g.connect(b, a, 0).unwrap();
        assert_eq!(g.get(b).source, Some(a));
        assert_eq!(g.get(b).connection, PortConnection::Connected);
    }

    #[test]
    fn connect_with_delay_becomes_synchronous() {
        let mut g = PortGraph::new();
        let a = declare_u32(&mut g, "a", PortDirection::Output);
        let b = declare_u32(&mut g, "b", PortDirection::Register);
        g.connect(b, a, 2).unwrap();
        assert_eq!(g.get(b).connection, PortConnection::Synchronous);
        assert_eq!(g.get(b).delay_cycles, 2);
    }

    #[test]
    fn self_connection_is_rejected() {
        let mut g = PortGraph::new();
        let a = declare_u32(&mut g, "a", PortDirection::Output);
        assert!(g.connect(a, a, 0).is_err());
    }

    #[test]
    fn size_mismatch_is_rejected() {
        let mut g = PortGraph::new();
        let a = g.declare("a", "Top", PortDirection::Output, PortInfo::new(8, 64, true, "u64"), 0).unwrap();
        let b = declare_u32(&mut g, "b", PortDirection::Input);
        assert!(g.connect(b, a, 0).is_err());
    }

    #[test]
    fn double_connect_without_inout_is_rejected() {
        let mut g = PortGraph::new();
        let a = declare_u32(&mut g, "a", PortDirection::Output);
        let b = declare_u32(&mut g, "b", PortDirection::Output);
        let c = declare_u32(&mut g, "c", PortDirection::Input);
        g.connect(c, a, 0).unwrap();
        assert!(g.connect(c, b, 0).is_err());
    }

    #[test]
    fn wire_to_const_marks_read_only_and_interns() {
        let mut g = PortGraph::new();
        let mut pool = ConstantPool::new();
        let a = declare_u32(&mut g, "a", PortDirection::Input);
        g.wire_to_const(a, &mut pool, &[1, 0, 0, 0]).unwrap();
        assert!(g.get(a).read_only);
        assert_eq!(g.get(a).connection, PortConnection::Constant);
        assert!(g.get(a).const_value.is_some());
    }

    #[test]
    fn construction_after_finish_is_rejected() {
        let mut g = PortGraph::new();
        g.finish();
        assert!(g.declare("a", "Top", PortDirection::Input, PortInfo::new(4, 32, true, "u32"), 0).is_err());
    }

    #[test]
    fn display_name_uses_component_path_and_field_name() {
        let mut g = PortGraph::new();
        let a = declare_u32(&mut g, "enable", PortDirection::Input);
        assert_eq!(g.get(a).display_name(true), "Top.enable");
    }
}
