//! Hierarchy Builder.
//!
//! Construction is driven by a stack of frames, one per component or
//! sub-interface currently being built, modeled as an explicit
//! `builder(cx)` free-function call rather than base-class-constructor
//! side effects. Each class's static descriptor is built on first
//! construction and validated against on every subsequent construction
//! of that class, so a mismatch between two instances of the same class
//! is caught immediately rather than silently diverging.

use rustc_hash::FxHashMap;
use std::fmt;

use crate::error::StructuralError;
use crate::ports::{PortDirection, PortInfo};

/// Stable identifier for a constructed component. Indexes into
/// [`Hierarchy::components`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(pub u32);

/// One node in the parent/children component tree.
#[derive(Debug)]
pub struct Component {
    pub id: ComponentId,
    pub parent: Option<ComponentId>,
    pub children: Vec<ComponentId>,
    pub class_name: String,
    pub instance_name: Option<String>,
    /// Unique among siblings sharing `class_name`; a 15-bit sibling ID.
    pub sibling_id: u16,
    pub active: bool,
    pub trace_keys: u64,
    pub descriptor: InterfaceDescriptorId,
}

/// Handle to a shared-per-class [`InterfaceDescriptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterfaceDescriptorId(pub u32);

/// One entry in an [`InterfaceDescriptor`]: a port, a sub-interface, or an
/// array of either.
#[derive(Debug, Clone)]
pub struct InterfaceEntry {
    pub offset: usize,
    pub direction: PortDirection,
    pub is_array: bool,
    pub is_base_class: bool,
    pub stride: usize,
    pub kind: EntryKind,
}

#[derive(Debug, Clone)]
pub enum EntryKind {
    Port(PortInfo),
    SubInterface(InterfaceDescriptorId),
}

/// Static, shared-per-class metadata.
#[derive(Debug, Clone, Default)]
pub struct InterfaceDescriptor {
    pub class_name: String,
    pub entries: Vec<InterfaceEntry>,
    pub max_offset: usize,
    pub clock_port_offsets: Vec<usize>,
    pub contains_array: bool,
    pub contains_array_with_clock: bool,
}

impl InterfaceDescriptor {
    fn push_entry(&mut self, entry: InterfaceEntry) {
        self.max_offset = self.max_offset.max(entry.offset);
        if matches!(entry.direction, PortDirection::Clock) {
            self.clock_port_offsets.push(entry.offset);
        }
        if entry.is_array {
            self.contains_array = true;
            if matches!(entry.direction, PortDirection::Clock) {
                self.contains_array_with_clock = true;
            }
        }
        self.entries.push(entry);
    }

    /// Validates that `entry` matches the entry already recorded at the
    /// same position on a prior construction of this class.
    fn validate_entry(&self, index: usize, entry: &InterfaceEntry) -> Result<(), StructuralError> {
        let existing = &self.entries[index];
        let matches = existing.offset == entry.offset
            && existing.direction == entry.direction
            && existing.is_array == entry.is_array;
        if !matches {
            return Err(StructuralError::MissingBaseClass {
                class_name: self.class_name.clone(),
            });
        }
        Ok(())
    }
}

/// One frame of the construction-time stack.
///
/// A frame is "in-progress" until its owning component's base-class
/// constructor finishes running and the live pointer gets patched in; in
/// this builder-style rewrite that corresponds to the window between
/// `BuildContext::push_frame` and the `build(cx)` call returning.
pub struct Frame {
    pub descriptor_id: InterfaceDescriptorId,
    pub is_array_element: bool,
    pub in_progress: bool,
    /// Next port id to hand out per direction, for per-parent id assignment.
    next_port_index: FxHashMap<PortDirection, u32>,
    /// Building vs. validating: `Some(0)` once the descriptor already has
    /// entries recorded from a prior construction of the same class.
    next_entry_index: usize,
}

impl Frame {
    fn new(descriptor_id: InterfaceDescriptorId, is_array_element: bool) -> Self {
        Self {
            descriptor_id,
            is_array_element,
            in_progress: true,
            next_port_index: FxHashMap::default(),
            next_entry_index: 0,
        }
    }
}

/// Construction-time frame stack.
///
/// Rendered innermost-frame-first for fatal-error dumps.
#[derive(Default)]
pub struct ConstructStack {
    frames: Vec<Frame>,
}

impl ConstructStack {
    pub fn push(&mut self, descriptor_id: InterfaceDescriptorId, is_array_element: bool) {
        self.frames.push(Frame::new(descriptor_id, is_array_element));
    }

    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    /// The innermost live frame, which is where port/sub-interface
    /// construction callbacks append their entry.
    pub fn current_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

impl fmt::Display for ConstructStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "construction stack ({} frame(s), innermost first):", self.frames.len())?;
        for (i, frame) in self.frames.iter().enumerate().rev() {
            writeln!(
                f,
                "  #{i} descriptor={:?} array_element={} in_progress={}",
                frame.descriptor_id, frame.is_array_element, frame.in_progress
            )?;
        }
        Ok(())
    }
}

/// The full component tree plus the per-class descriptor table.
#[derive(Default)]
pub struct Hierarchy {
    pub components: Vec<Component>,
    pub descriptors: Vec<InterfaceDescriptor>,
    /// `parent -> class_name -> next sibling id` for stable 15-bit IDs.
    sibling_counters: FxHashMap<(Option<ComponentId>, String), u16>,
    /// Per-parent custom name overrides (e.g. array element naming).
    name_overrides: FxHashMap<(ComponentId, u16), String>,
}

impl Hierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_descriptor(&mut self, class_name: impl Into<String>) -> InterfaceDescriptorId {
        let id = InterfaceDescriptorId(self.descriptors.len() as u32);
        self.descriptors.push(InterfaceDescriptor { class_name: class_name.into(), ..Default::default() });
        id
    }

    pub fn descriptor_mut(&mut self, id: InterfaceDescriptorId) -> &mut InterfaceDescriptor {
        &mut self.descriptors[id.0 as usize]
    }

    pub fn descriptor(&self, id: InterfaceDescriptorId) -> &InterfaceDescriptor {
        &self.descriptors[id.0 as usize]
    }

    /// Appends an entry to the frame's descriptor, building it on first
    /// construction and validating against it on subsequent ones.
    pub fn record_entry(&mut self, frame: &mut Frame, entry: InterfaceEntry) -> Result<(), StructuralError> {
        let descriptor = &mut self.descriptors[frame.descriptor_id.0 as usize];
        if frame.next_entry_index < descriptor.entries.len() {
            descriptor.validate_entry(frame.next_entry_index, &entry)?;
        } else {
            descriptor.push_entry(entry);
        }
        frame.next_entry_index += 1;
        Ok(())
    }

    /// Creates a component, assigning its sibling id by counting prior
    /// siblings of the same class under the same parent.
    pub fn create_component(
        &mut self,
        parent: Option<ComponentId>,
        class_name: impl Into<String>,
        instance_name: Option<String>,
        descriptor: InterfaceDescriptorId,
    ) -> ComponentId {
        let class_name = class_name.into();
        let key = (parent, class_name.clone());
        let sibling_id = *self.sibling_counters.get(&key).unwrap_or(&0);
        self.sibling_counters.insert(key, sibling_id + 1);

        let id = ComponentId(self.components.len() as u32);
        self.components.push(Component {
            id,
            parent,
            children: Vec::new(),
            class_name,
            instance_name,
            sibling_id,
            active: true,
            trace_keys: 0,
            descriptor,
        });
        if let Some(p) = parent {
            self.components[p.0 as usize].children.push(id);
        }
        id
    }

    pub fn component(&self, id: ComponentId) -> &Component {
        &self.components[id.0 as usize]
    }

    pub fn component_mut(&mut self, id: ComponentId) -> &mut Component {
        &mut self.components[id.0 as usize]
    }

    pub fn set_name_override(&mut self, parent: ComponentId, sibling_id: u16, name: impl Into<String>) {
        self.name_overrides.insert((parent, sibling_id), name.into());
    }

    /// `parent.childClassName[id]`, honoring per-parent name overrides used
    /// by arrays.
    pub fn hierarchical_name(&self, id: ComponentId) -> String {
        let c = self.component(id);
        let leaf = if let Some(parent) = c.parent {
            if let Some(custom) = self.name_overrides.get(&(parent, c.sibling_id)) {
                custom.clone()
            } else {
                format!("{}[{}]", c.class_name, c.sibling_id)
            }
        } else {
            c.class_name.clone()
        };
        match c.parent {
            Some(parent) => format!("{}.{}", self.hierarchical_name(parent), leaf),
            None => leaf,
        }
    }

    /// Enforces leaf-first teardown order.
    pub fn teardown_order(&self) -> Vec<ComponentId> {
        fn visit(h: &Hierarchy, id: ComponentId, out: &mut Vec<ComponentId>) {
            for &child in &h.component(id).children {
                visit(h, child, out);
            }
            out.push(id);
        }
        let mut out = Vec::new();
        let roots: Vec<ComponentId> = self.components.iter().filter(|c| c.parent.is_none()).map(|c| c.id).collect();
        for r in roots {
            visit(self, r, &mut out);
        }
        out
    }
}
