//! Hierarchical change descriptions.
//!
//! An [`ElementDelta`] describes how one element changed between two
//! observed states and owns the deltas of its affected children. Deltas are
//! assembled by an [`ElementDeltaBuilder`] and are read-only once published
//! in an event.

mod builder;
mod display;

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
pub use builder::ElementDeltaBuilder;
pub use display::DeltaDisplay;
use indexmap::IndexMap;
use rustc_hash::FxBuildHasher;

use crate::error::{Error, Result};
use crate::handle::Handle;

/// What happened to an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeltaKind {
	/// Nothing recorded; only valid for a delta root.
	#[default]
	NoChange,
	/// The element and its whole subtree were added.
	Added,
	/// The element and its whole subtree were removed.
	Removed,
	/// The element changed; see the flags and affected children.
	Changed,
}

impl DeltaKind {
	/// Returns the one-character debug symbol.
	pub const fn symbol(self) -> char {
		match self {
			Self::NoChange => '?',
			Self::Added => '+',
			Self::Removed => '-',
			Self::Changed => '*',
		}
	}
}

bitflags! {
	/// Details of a change.
	///
	/// Bits 32 and above are reserved for model-specific flags; see
	/// [`DeltaFlags::model`].
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
	pub struct DeltaFlags: u64 {
		/// The element's own content changed.
		const CONTENT = 1 << 0;
		/// Some children changed.
		const CHILDREN = 1 << 1;
		/// The element was moved here from another element.
		const MOVED_FROM = 1 << 2;
		/// The element was moved away to another element.
		const MOVED_TO = 1 << 3;
		/// The element changed position among its siblings.
		const REORDER = 1 << 4;
		/// Children were inspected; absence of `CONTENT` is a verified fact.
		const FINE_GRAINED = 1 << 5;
		/// The element was opened or closed.
		const OPEN = 1 << 6;
		/// The element's description changed.
		const DESCRIPTION = 1 << 7;
		/// The element became or stopped being a working copy.
		const WORKING_COPY = 1 << 8;
		/// The element's underlying resource changed.
		const UNDERLYING_RESOURCE = 1 << 9;
		/// Markers attached to the element changed.
		const MARKERS = 1 << 10;
		/// The element's synchronization state changed.
		const SYNC = 1 << 11;
	}
}

impl DeltaFlags {
	/// Returns the model-specific flag number `n` (bit `32 + n`).
	pub const fn model(n: u32) -> Self {
		Self::from_bits_retain(1 << (32 + (n & 31)))
	}
}

/// Kind of a resource delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceDeltaKind {
	/// The resource was added.
	Added,
	/// The resource was removed.
	Removed,
	/// The resource changed.
	Changed,
}

impl ResourceDeltaKind {
	const fn symbol(self) -> char {
		match self {
			Self::Added => '+',
			Self::Removed => '-',
			Self::Changed => '*',
		}
	}
}

/// A change to a non-element resource, attached opaquely to an element delta.
pub trait ResourceDelta: fmt::Debug + Send + Sync {
	/// Returns the resource path; resource deltas are ordered by it.
	fn path(&self) -> &str;
	/// Returns what happened to the resource.
	fn kind(&self) -> ResourceDeltaKind;
}

/// A change to a marker (problem, bookmark, ...) attached to an element.
pub trait MarkerDelta: fmt::Debug + Send + Sync {
	/// Returns the marker id.
	fn marker_id(&self) -> u64;
}

type ChildMap = IndexMap<Handle, ElementDelta, FxBuildHasher>;

/// A node of a delta tree.
///
/// Added and removed deltas never have children: they stand for the whole
/// subtree.
#[derive(Debug, Clone)]
pub struct ElementDelta {
	element: Handle,
	kind: DeltaKind,
	flags: DeltaFlags,
	children: ChildMap,
	moved_from: Option<Handle>,
	moved_to: Option<Handle>,
	marker_deltas: Vec<Arc<dyn MarkerDelta>>,
	resource_deltas: Vec<Arc<dyn ResourceDelta>>,
}

/// Outcome of composing a delta into an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Composed {
	Kept,
	/// An addition and a removal cancelled each other.
	Cancelled,
}

impl ElementDelta {
	/// Creates an empty delta for `element`.
	pub fn new(element: Handle) -> Self {
		Self {
			element,
			kind: DeltaKind::NoChange,
			flags: DeltaFlags::empty(),
			children: ChildMap::default(),
			moved_from: None,
			moved_to: None,
			marker_deltas: Vec::new(),
			resource_deltas: Vec::new(),
		}
	}

	pub(crate) fn with_kind(element: Handle, kind: DeltaKind, flags: DeltaFlags) -> Self {
		let mut delta = Self::new(element);
		delta.kind = kind;
		delta.flags = flags;
		delta
	}

	/// Starts a builder rooted at `element`.
	pub fn builder(element: Handle) -> ElementDeltaBuilder {
		ElementDeltaBuilder::new(element)
	}

	/// Returns the element this delta describes.
	pub fn element(&self) -> &Handle {
		&self.element
	}

	/// Returns the kind.
	pub fn kind(&self) -> DeltaKind {
		self.kind
	}

	/// Returns the flags.
	pub fn flags(&self) -> DeltaFlags {
		self.flags
	}

	/// Returns where the element was moved from, with [`DeltaFlags::MOVED_FROM`].
	pub fn moved_from_element(&self) -> Option<&Handle> {
		self.moved_from.as_ref()
	}

	/// Returns where the element was moved to, with [`DeltaFlags::MOVED_TO`].
	pub fn moved_to_element(&self) -> Option<&Handle> {
		self.moved_to.as_ref()
	}

	/// Returns the marker deltas attached to this node.
	pub fn marker_deltas(&self) -> &[Arc<dyn MarkerDelta>] {
		&self.marker_deltas
	}

	/// Returns the resource deltas attached to this node.
	pub fn resource_deltas(&self) -> &[Arc<dyn ResourceDelta>] {
		&self.resource_deltas
	}

	/// Returns the deltas of all affected children.
	pub fn affected_children(&self) -> impl Iterator<Item = &ElementDelta> {
		self.children.values()
	}

	/// Returns the deltas of added children.
	pub fn added_children(&self) -> Vec<&ElementDelta> {
		self.children_of(DeltaKind::Added)
	}

	/// Returns the deltas of removed children.
	pub fn removed_children(&self) -> Vec<&ElementDelta> {
		self.children_of(DeltaKind::Removed)
	}

	/// Returns the deltas of changed children.
	pub fn changed_children(&self) -> Vec<&ElementDelta> {
		self.children_of(DeltaKind::Changed)
	}

	fn children_of(&self, kind: DeltaKind) -> Vec<&ElementDelta> {
		self.children.values().filter(|c| c.kind == kind).collect()
	}

	/// Returns true if the delta records nothing at all.
	pub fn is_empty(&self) -> bool {
		self.kind == DeltaKind::NoChange
			&& self.children.is_empty()
			&& self.marker_deltas.is_empty()
			&& self.resource_deltas.is_empty()
	}

	/// Returns true for added and removed deltas.
	pub fn is_status_change(&self) -> bool {
		matches!(self.kind, DeltaKind::Added | DeltaKind::Removed)
	}

	/// Returns true if the delta changes the shape of the tree at this node.
	pub fn is_structural_change(&self) -> bool {
		self.is_status_change() || self.flags.intersects(DeltaFlags::CHILDREN | DeltaFlags::REORDER)
	}

	/// Finds the delta for `element` in this tree.
	///
	/// Returns `None` if nothing was recorded for it, or if an ancestor was
	/// added or removed as a whole.
	pub fn find_delta(&self, element: &Handle) -> Option<&ElementDelta> {
		if self.element.equals_along_same_parent_chain(element) {
			return Some(self);
		}
		let mut path = vec![element];
		let mut current = element.parent();
		loop {
			match current {
				None => return None,
				Some(parent) if parent.equals_along_same_parent_chain(&self.element) => break,
				Some(parent) => {
					path.push(parent);
					current = parent.parent();
				}
			}
		}
		let mut node = self;
		for step in path.into_iter().rev() {
			if node.is_status_change() {
				return None;
			}
			node = node.children.get(step)?;
			if !node.element.equals_along_same_parent_chain(step) {
				return None;
			}
		}
		Some(node)
	}

	/// Merges `other`, a delta for the same element, into this one.
	///
	/// Kinds compose as in [`ElementDeltaBuilder`]; children are merged
	/// recursively.
	pub fn merge_with(&mut self, other: ElementDelta) -> Result<()> {
		if !self.element.equals_along_same_parent_chain(&other.element) {
			return Err(Error::illegal_argument(format!(
				"cannot merge delta for {:?} into delta for {:?}",
				other.element, self.element
			)));
		}
		if self.compose(other) == Composed::Cancelled {
			self.reset();
		}
		Ok(())
	}

	/// Copies kind, flags, moves and attachments of `other` into this delta;
	/// with `deep` also its affected children.
	///
	/// Fails if both deltas already carry different kinds.
	pub fn copy_from(&mut self, other: &ElementDelta, deep: bool) -> Result<()> {
		if !self.element.equals_along_same_parent_chain(&other.element) {
			return Err(Error::illegal_argument(format!(
				"cannot copy delta for {:?} into delta for {:?}",
				other.element, self.element
			)));
		}
		if self.kind != DeltaKind::NoChange && other.kind != DeltaKind::NoChange && self.kind != other.kind {
			return Err(Error::illegal_argument(format!(
				"incompatible delta kinds for {:?}: {:?} vs {:?}",
				self.element, self.kind, other.kind
			)));
		}
		if other.kind != DeltaKind::NoChange {
			self.kind = other.kind;
		}
		self.flags |= other.flags;
		if other.moved_from.is_some() {
			self.moved_from.clone_from(&other.moved_from);
		}
		if other.moved_to.is_some() {
			self.moved_to.clone_from(&other.moved_to);
		}
		self.marker_deltas.extend(other.marker_deltas.iter().cloned());
		self.resource_deltas.extend(other.resource_deltas.iter().cloned());
		if self.is_status_change() {
			self.children.clear();
		} else if deep {
			for (key, child) in &other.children {
				self.children.insert(key.clone(), child.clone());
			}
		}
		Ok(())
	}

	/// Renders the delta with names for model-specific flags.
	pub fn display_with<'a>(&'a self, custom_flags: &'a [(DeltaFlags, &'static str)]) -> DeltaDisplay<'a> {
		DeltaDisplay::new(self, custom_flags)
	}

	fn reset(&mut self) {
		*self = ElementDelta::new(self.element.clone());
	}

	/// Registers `child` under this node, composing with an existing entry.
	fn add_affected_child(&mut self, child: ElementDelta) {
		match self.kind {
			DeltaKind::Added | DeltaKind::Removed => return,
			DeltaKind::Changed => self.flags |= DeltaFlags::CHILDREN,
			DeltaKind::NoChange => {
				self.kind = DeltaKind::Changed;
				self.flags |= DeltaFlags::CHILDREN;
			}
		}
		match self.children.get_mut(&child.element) {
			None => {
				self.children.insert(child.element.clone(), child);
			}
			Some(existing) => {
				let key = child.element.clone();
				if existing.compose(child) == Composed::Cancelled {
					self.children.shift_remove(&key);
				}
			}
		}
	}

	/// Composes `incoming` into this delta for the same element.
	fn compose(&mut self, incoming: ElementDelta) -> Composed {
		use DeltaKind::*;
		match (self.kind, incoming.kind) {
			(_, NoChange) => {
				self.absorb(incoming);
			}
			(NoChange, _) => {
				let flags = self.flags;
				let markers = std::mem::take(&mut self.marker_deltas);
				let resources = std::mem::take(&mut self.resource_deltas);
				*self = incoming;
				self.flags |= flags;
				self.marker_deltas.splice(0..0, markers);
				self.resource_deltas.splice(0..0, resources);
			}
			(Added, Added | Changed) => {}
			(Added, Removed) => return Composed::Cancelled,
			(Removed, Added) => {
				*self = incoming;
				self.kind = Changed;
				self.flags |= DeltaFlags::CONTENT;
			}
			(Removed, Changed | Removed) => {}
			(Changed, Added | Removed) => {
				*self = incoming;
			}
			(Changed, Changed) => {
				self.absorb(incoming);
			}
		}
		Composed::Kept
	}

	/// Merges flags, moves, attachments and children of `incoming`.
	fn absorb(&mut self, incoming: ElementDelta) {
		self.flags |= incoming.flags;
		if incoming.moved_from.is_some() {
			self.moved_from = incoming.moved_from;
		}
		if incoming.moved_to.is_some() {
			self.moved_to = incoming.moved_to;
		}
		self.marker_deltas.extend(incoming.marker_deltas);
		self.resource_deltas.extend(incoming.resource_deltas);
		for (_, child) in incoming.children {
			self.add_affected_child(child);
		}
	}
}

impl fmt::Display for ElementDelta {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(&self.display_with(&[]), f)
	}
}
