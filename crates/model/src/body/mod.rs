//! Element bodies.
//!
//! A body is the state half of a handle: its children and, for source
//! elements, text ranges, the snapshot the structure was built from, and
//! named properties. Bodies are assembled mutably while a model builds
//! structure and become immutable once committed to the cache; a changed
//! element gets a new body rather than a mutated one, which is what lets the
//! change recorder keep the old snapshot around.

mod property;
mod source;

use std::any::Any;
use std::fmt;

pub use property::{Properties, Property, PropertyType, PropertyValue};
pub use source::{SourceElementBody, TextRange};

use crate::delta::DeltaFlags;
use crate::handle::{ElementKind, Handle};

/// The state of one element at one point in time.
pub trait ElementBody: Any + Send + Sync + fmt::Debug {
	/// Returns the children in order.
	fn children(&self) -> &[Handle];

	/// Returns the delta flags describing how this body's own state (not its
	/// children) differs from `old`. Empty means no difference.
	fn find_content_change(&self, _old: &dyn ElementBody) -> DeltaFlags {
		DeltaFlags::empty()
	}

	/// Upcast for downcasting to a concrete body type.
	fn as_any(&self) -> &dyn Any;
}

impl<'a> dyn ElementBody + 'a {
	/// Downcasts to a [`SourceElementBody`].
	pub fn as_source(&self) -> Option<&SourceElementBody> {
		self.as_any().downcast_ref::<SourceElementBody>()
	}

	/// Returns the children of the given kind, in order.
	pub fn children_of_kind(&self, kind: ElementKind) -> Vec<Handle> {
		self.children().iter().filter(|c| c.kind() == kind).cloned().collect()
	}
}

/// A body that only records children.
///
/// Children never repeat: adding a present child and removing an absent one
/// are no-ops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Body {
	children: Vec<Handle>,
}

impl Body {
	/// Creates a body without children.
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates a body with the given children.
	pub fn with_children(children: impl IntoIterator<Item = Handle>) -> Self {
		let mut body = Self::new();
		body.set_children(children);
		body
	}

	/// Replaces the children, dropping repeats.
	pub fn set_children(&mut self, children: impl IntoIterator<Item = Handle>) {
		self.children.clear();
		for child in children {
			self.add_child(child);
		}
	}

	/// Appends a child unless it is already present.
	pub fn add_child(&mut self, child: Handle) {
		if !self.children.contains(&child) {
			self.children.push(child);
		}
	}

	/// Removes a child if present.
	pub fn remove_child(&mut self, child: &Handle) {
		self.children.retain(|c| c != child);
	}
}

impl ElementBody for Body {
	fn children(&self) -> &[Handle] {
		&self.children
	}

	fn as_any(&self) -> &dyn Any {
		self
	}
}
