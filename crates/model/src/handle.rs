//! Element handles.
//!
//! A [`Handle`] identifies a model element by its kind, name, occurrence
//! count and parent. Handles carry no state and never touch the body cache;
//! they may be created and dropped freely, and two equal handles need not be
//! the same allocation.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rustc_hash::FxHasher;

/// Static descriptor of an element type.
///
/// Kinds compare by name. The two switches control how the element manager
/// and handle equality treat elements of this kind.
#[derive(Clone, Copy)]
pub struct ElementKind {
	name: &'static str,
	openable: bool,
	parent_independent: bool,
}

impl ElementKind {
	/// Creates a non-openable, parent-dependent kind.
	pub const fn new(name: &'static str) -> Self {
		Self {
			name,
			openable: false,
			parent_independent: false,
		}
	}

	/// Marks elements of this kind as openable: they build their own
	/// structure instead of having their body built by an ancestor.
	pub const fn openable(mut self) -> Self {
		self.openable = true;
		self
	}

	/// Makes equality of handles of this kind ignore the parent chain.
	///
	/// Use for elements that are the same thing wherever they are reached
	/// from, such as a shared archive referenced by several projects. The
	/// strict [`Handle::equals_along_same_parent_chain`] still tells them
	/// apart.
	pub const fn parent_independent(mut self) -> Self {
		self.parent_independent = true;
		self
	}

	/// Returns the kind name.
	pub const fn name(&self) -> &'static str {
		self.name
	}

	/// Returns true if elements of this kind are openable.
	pub const fn is_openable(&self) -> bool {
		self.openable
	}

	/// Returns true if equality ignores the parent chain.
	pub const fn is_parent_independent(&self) -> bool {
		self.parent_independent
	}
}

impl PartialEq for ElementKind {
	fn eq(&self, other: &Self) -> bool {
		self.name == other.name
	}
}

impl Eq for ElementKind {}

impl Hash for ElementKind {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.name.hash(state);
	}
}

impl fmt::Debug for ElementKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name)
	}
}

struct HandleData {
	kind: ElementKind,
	name: Option<Arc<str>>,
	occurrence: u32,
	parent: Option<Handle>,
	hash: u64,
}

/// An immutable, cheaply clonable element identifier.
#[derive(Clone)]
pub struct Handle(Arc<HandleData>);

impl Handle {
	/// Creates a root handle (no parent).
	pub fn root(kind: ElementKind, name: impl Into<Arc<str>>) -> Self {
		Self::build(kind, Some(name.into()), 1, None)
	}

	/// Creates an unnamed root handle.
	pub fn unnamed_root(kind: ElementKind) -> Self {
		Self::build(kind, None, 1, None)
	}

	/// Creates a child handle with occurrence count 1.
	pub fn child(&self, kind: ElementKind, name: impl Into<Arc<str>>) -> Self {
		self.child_occurrence(kind, name, 1)
	}

	/// Creates a child handle with an explicit occurrence count.
	///
	/// The occurrence count tells apart siblings of the same kind and name;
	/// the first such sibling has count 1.
	pub fn child_occurrence(&self, kind: ElementKind, name: impl Into<Arc<str>>, occurrence: u32) -> Self {
		Self::build(kind, Some(name.into()), occurrence.max(1), Some(self.clone()))
	}

	fn build(kind: ElementKind, name: Option<Arc<str>>, occurrence: u32, parent: Option<Handle>) -> Self {
		let mut hasher = FxHasher::default();
		kind.hash(&mut hasher);
		name.hash(&mut hasher);
		occurrence.hash(&mut hasher);
		if !kind.parent_independent
			&& let Some(parent) = &parent
		{
			parent.0.hash.hash(&mut hasher);
		}
		Self(Arc::new(HandleData {
			kind,
			name,
			occurrence,
			parent,
			hash: hasher.finish(),
		}))
	}

	/// Returns the parent handle, or `None` for a root.
	pub fn parent(&self) -> Option<&Handle> {
		self.0.parent.as_ref()
	}

	/// Returns the element name.
	pub fn name(&self) -> Option<&str> {
		self.0.name.as_deref()
	}

	/// Returns the element kind.
	pub fn kind(&self) -> ElementKind {
		self.0.kind
	}

	/// Returns the occurrence count (1-based).
	pub fn occurrence(&self) -> u32 {
		self.0.occurrence
	}

	/// Returns true if the element's kind is openable.
	pub fn is_openable(&self) -> bool {
		self.0.kind.openable
	}

	/// Returns the number of ancestors.
	pub fn depth(&self) -> usize {
		let mut depth = 0;
		let mut current = self.parent();
		while let Some(parent) = current {
			depth += 1;
			current = parent.parent();
		}
		depth
	}

	/// Returns true if both handles are the same allocation.
	pub fn ptr_eq(&self, other: &Handle) -> bool {
		Arc::ptr_eq(&self.0, &other.0)
	}

	/// Structural equality; same as `==`.
	///
	/// For parent-independent kinds this ignores the parent chain. Algorithms
	/// walking ancestor chains must use
	/// [`Handle::equals_along_same_parent_chain`] instead.
	pub fn structurally_equal(&self, other: &Handle) -> bool {
		self == other
	}

	/// Strict equality: every pair of ancestors along both chains is equal
	/// and both chains have the same length.
	pub fn equals_along_same_parent_chain(&self, other: &Handle) -> bool {
		let mut a = Some(self);
		let mut b = Some(other);
		loop {
			match (a, b) {
				(None, None) => return true,
				(Some(x), Some(y)) => {
					if x.ptr_eq(y) {
						return true;
					}
					if !x.same_node(y) {
						return false;
					}
					a = x.parent();
					b = y.parent();
				}
				_ => return false,
			}
		}
	}

	/// Compares everything but the parent.
	fn same_node(&self, other: &Handle) -> bool {
		self.0.kind == other.0.kind && self.0.occurrence == other.0.occurrence && self.0.name == other.0.name
	}
}

impl PartialEq for Handle {
	fn eq(&self, other: &Self) -> bool {
		if self.ptr_eq(other) {
			return true;
		}
		if self.0.hash != other.0.hash || !self.same_node(other) {
			return false;
		}
		self.0.kind.parent_independent || self.0.parent == other.0.parent
	}
}

impl Eq for Handle {}

impl Hash for Handle {
	fn hash<H: Hasher>(&self, state: &mut H) {
		state.write_u64(self.0.hash);
	}
}

impl fmt::Display for Handle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.name() {
			Some(name) => f.write_str(name)?,
			None => write!(f, "<{}>", self.0.kind.name)?,
		}
		if self.0.occurrence > 1 {
			write!(f, "#{}", self.0.occurrence)?;
		}
		Ok(())
	}
}

impl fmt::Debug for Handle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}({})", self.0.kind.name, crate::elements::path(self))
	}
}
