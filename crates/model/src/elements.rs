//! Handle-only algorithms shared by every model.
//!
//! None of these touch the body cache. Ancestor tests use
//! [`Handle::equals_along_same_parent_chain`], so parent-independent kinds do
//! not produce false positives.

use crate::handle::{ElementKind, Handle};

/// Iterator over the proper ancestors of a handle, nearest first.
pub struct Ancestors<'a> {
	next: Option<&'a Handle>,
}

impl<'a> Iterator for Ancestors<'a> {
	type Item = &'a Handle;

	fn next(&mut self) -> Option<Self::Item> {
		let current = self.next?;
		self.next = current.parent();
		Some(current)
	}
}

/// Returns the proper ancestors of `element`, nearest first.
pub fn ancestors(element: &Handle) -> Ancestors<'_> {
	Ancestors {
		next: element.parent(),
	}
}

/// Returns the root of the tree `element` belongs to.
pub fn root(element: &Handle) -> &Handle {
	ancestors(element).last().unwrap_or(element)
}

/// Returns true if `ancestor` is a proper ancestor of `element`.
pub fn is_ancestor_of(ancestor: &Handle, element: &Handle) -> bool {
	ancestors(element).any(|a| a.equals_along_same_parent_chain(ancestor))
}

/// Returns the nearest proper ancestor of the given kind.
pub fn ancestor_of_kind<'a>(element: &'a Handle, kind: ElementKind) -> Option<&'a Handle> {
	ancestors(element).find(|a| a.kind() == kind)
}

/// Returns `element` if it is openable, else its nearest openable ancestor.
pub fn openable(element: &Handle) -> Option<&Handle> {
	if element.is_openable() {
		return Some(element);
	}
	ancestors(element).find(|a| a.is_openable())
}

/// Renders the names from the root down, separated by `/`.
pub fn path(element: &Handle) -> String {
	let mut chain: Vec<&Handle> = ancestors(element).collect();
	chain.reverse();
	chain.push(element);
	chain.iter().map(|h| h.to_string()).collect::<Vec<_>>().join("/")
}
