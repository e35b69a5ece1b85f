use std::sync::Arc;

use rustc_hash::FxHashSet;
use tracing::trace;

use super::{Composed, DeltaFlags, DeltaKind, ElementDelta, MarkerDelta, ResourceDelta};
use crate::error::{Error, Result};
use crate::handle::Handle;

/// Assembles one delta tree rooted at a fixed element.
///
/// Every call names an element that must be the root or one of its
/// descendants; intermediate nodes along the path are created as
/// `CHANGED | CHILDREN`. Statuses reported for the same element compose:
///
/// | existing | call | result |
/// |---|---|---|
/// | none | any | that status |
/// | added | changed | added |
/// | added | removed | none |
/// | removed | added | changed, `CONTENT` |
/// | removed | changed | removed |
/// | changed | changed | changed, flags or-ed |
/// | changed | added / removed | added / removed |
#[derive(Debug)]
pub struct ElementDeltaBuilder {
	root: ElementDelta,
	with_markers: FxHashSet<Handle>,
}

impl ElementDeltaBuilder {
	/// Starts an empty delta rooted at `root`.
	pub fn new(root: Handle) -> Self {
		Self {
			root: ElementDelta::new(root),
			with_markers: FxHashSet::default(),
		}
	}

	/// Reports that `element` was added.
	pub fn added(&mut self, element: &Handle) -> Result<&mut Self> {
		self.added_with(element, DeltaFlags::empty())
	}

	/// Reports that `element` was added, with extra flags.
	pub fn added_with(&mut self, element: &Handle, flags: DeltaFlags) -> Result<&mut Self> {
		self.insert(ElementDelta::with_kind(element.clone(), DeltaKind::Added, flags))
	}

	/// Reports that `element` was removed.
	pub fn removed(&mut self, element: &Handle) -> Result<&mut Self> {
		self.removed_with(element, DeltaFlags::empty())
	}

	/// Reports that `element` was removed, with extra flags.
	pub fn removed_with(&mut self, element: &Handle, flags: DeltaFlags) -> Result<&mut Self> {
		self.insert(ElementDelta::with_kind(element.clone(), DeltaKind::Removed, flags))
	}

	/// Reports that `element` changed as described by `flags`.
	pub fn changed(&mut self, element: &Handle, flags: DeltaFlags) -> Result<&mut Self> {
		self.insert(ElementDelta::with_kind(element.clone(), DeltaKind::Changed, flags))
	}

	/// Reports that `element` was added by moving it from `origin`.
	pub fn moved_from(&mut self, element: &Handle, origin: &Handle) -> Result<&mut Self> {
		let mut delta = ElementDelta::with_kind(element.clone(), DeltaKind::Added, DeltaFlags::MOVED_FROM);
		delta.moved_from = Some(origin.clone());
		self.insert(delta)
	}

	/// Reports that `element` was removed by moving it to `destination`.
	pub fn moved_to(&mut self, element: &Handle, destination: &Handle) -> Result<&mut Self> {
		let mut delta = ElementDelta::with_kind(element.clone(), DeltaKind::Removed, DeltaFlags::MOVED_TO);
		delta.moved_to = Some(destination.clone());
		self.insert(delta)
	}

	/// Attaches marker deltas to `element`.
	///
	/// Fails if markers were already attached to the same element.
	pub fn markers_changed(&mut self, element: &Handle, markers: Vec<Arc<dyn MarkerDelta>>) -> Result<&mut Self> {
		if self.with_markers.contains(element) {
			return Err(Error::illegal_state(format!(
				"marker deltas already attached to {element:?}"
			)));
		}
		let mut delta = ElementDelta::with_kind(element.clone(), DeltaKind::Changed, DeltaFlags::MARKERS);
		delta.marker_deltas = markers;
		self.insert(delta)?;
		self.with_markers.insert(element.clone());
		Ok(self)
	}

	/// Attaches a resource delta to `element`, marking it changed in content.
	pub fn add_resource_delta(&mut self, element: &Handle, resource: Arc<dyn ResourceDelta>) -> Result<&mut Self> {
		let mut delta = ElementDelta::with_kind(element.clone(), DeltaKind::Changed, DeltaFlags::CONTENT);
		delta.resource_deltas.push(resource);
		self.insert(delta)
	}

	/// Returns the delta built so far.
	pub fn delta(&self) -> &ElementDelta {
		&self.root
	}

	/// Returns true if nothing has been recorded.
	pub fn is_empty(&self) -> bool {
		self.root.is_empty()
	}

	/// Finishes the delta.
	pub fn build(self) -> ElementDelta {
		self.root
	}

	fn insert(&mut self, delta: ElementDelta) -> Result<&mut Self> {
		let path = self.path_to(&delta.element)?;
		trace!(element = ?delta.element, kind = ?delta.kind, flags = ?delta.flags, "Delta insert");
		insert_along(&mut self.root, &path, delta);
		Ok(self)
	}

	/// Returns the handles strictly below the root down to `element`,
	/// top-down.
	fn path_to(&self, element: &Handle) -> Result<Vec<Handle>> {
		let mut path = Vec::new();
		let mut current = Some(element);
		while let Some(e) = current {
			if e.equals_along_same_parent_chain(&self.root.element) {
				path.reverse();
				return Ok(path);
			}
			path.push(e.clone());
			current = e.parent();
		}
		Err(Error::illegal_argument(format!(
			"{element:?} is not within the delta root {:?}",
			self.root.element
		)))
	}
}

fn insert_along(node: &mut ElementDelta, path: &[Handle], delta: ElementDelta) {
	let Some((next, rest)) = path.split_first() else {
		if node.compose(delta) == Composed::Cancelled {
			node.reset();
		}
		return;
	};
	if node.is_status_change() {
		return;
	}
	if rest.is_empty() {
		node.add_affected_child(delta);
		return;
	}
	node.add_affected_child(ElementDelta::new(next.clone()));
	if let Some(child) = node.children.get_mut(next) {
		insert_along(child, rest, delta);
	}
}
