use std::any::Any;

use handly_buffer::Snapshot;

use super::{Body, ElementBody, Properties, Property, PropertyType};
use crate::delta::DeltaFlags;
use crate::handle::Handle;

/// A character range in a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextRange {
	/// First character.
	pub offset: usize,
	/// Number of characters.
	pub length: usize,
}

impl TextRange {
	/// Creates a range.
	pub const fn new(offset: usize, length: usize) -> Self {
		Self { offset, length }
	}

	/// Creates a range from `[start, end)`.
	pub fn from_bounds(start: usize, end: usize) -> Self {
		Self::new(start, end.saturating_sub(start))
	}

	/// Returns the end offset (exclusive).
	pub const fn end(&self) -> usize {
		self.offset + self.length
	}

	/// Returns true if `position` lies in `[offset, end]`.
	///
	/// The end is included so a caret placed right after an element still
	/// resolves to it.
	pub const fn covers(&self, position: usize) -> bool {
		self.offset <= position && position <= self.end()
	}
}

/// Body of an element backed by source text.
#[derive(Debug, Clone, Default)]
pub struct SourceElementBody {
	body: Body,
	full_range: Option<TextRange>,
	identifying_range: Option<TextRange>,
	snapshot: Option<Snapshot>,
	properties: Properties,
}

impl SourceElementBody {
	/// Creates an empty source body.
	pub fn new() -> Self {
		Self::default()
	}

	/// Replaces the children, dropping repeats.
	pub fn set_children(&mut self, children: impl IntoIterator<Item = Handle>) {
		self.body.set_children(children);
	}

	/// Appends a child unless it is already present.
	pub fn add_child(&mut self, child: Handle) {
		self.body.add_child(child);
	}

	/// Removes a child if present.
	pub fn remove_child(&mut self, child: &Handle) {
		self.body.remove_child(child);
	}

	/// Returns the range of the whole element.
	pub fn full_range(&self) -> Option<TextRange> {
		self.full_range
	}

	/// Sets the range of the whole element.
	pub fn set_full_range(&mut self, range: TextRange) {
		self.full_range = Some(range);
	}

	/// Returns the range of the element's name.
	pub fn identifying_range(&self) -> Option<TextRange> {
		self.identifying_range
	}

	/// Sets the range of the element's name.
	pub fn set_identifying_range(&mut self, range: TextRange) {
		self.identifying_range = Some(range);
	}

	/// Returns the snapshot the structure was built from.
	pub fn snapshot(&self) -> Option<&Snapshot> {
		self.snapshot.as_ref()
	}

	/// Sets the snapshot the structure was built from.
	pub fn set_snapshot(&mut self, snapshot: Snapshot) {
		self.snapshot = Some(snapshot);
	}

	/// Returns the properties.
	pub fn properties(&self) -> &Properties {
		&self.properties
	}

	/// Returns a property.
	pub fn get<T: PropertyType>(&self, property: &Property<T>) -> Option<T> {
		self.properties.get(property)
	}

	/// Sets a property.
	pub fn set<T: PropertyType>(&mut self, property: &Property<T>, value: T) {
		self.properties.set(property, value);
	}

	/// Returns the text covered by the full range.
	pub fn source_text(&self) -> Option<String> {
		let range = self.full_range?;
		self.snapshot.as_ref()?.slice(range.offset, range.end())
	}

	/// Compares ranges and snapshots of two bodies.
	fn same_source(&self, old: &SourceElementBody) -> bool {
		if self.full_range != old.full_range || self.identifying_range != old.identifying_range {
			return false;
		}
		match (&self.snapshot, &old.snapshot) {
			(Some(a), Some(b)) => a.is_equal_to(b),
			(None, None) => true,
			_ => false,
		}
	}
}

impl ElementBody for SourceElementBody {
	fn children(&self) -> &[Handle] {
		self.body.children()
	}

	fn find_content_change(&self, old: &dyn ElementBody) -> DeltaFlags {
		let Some(old) = old.as_source() else {
			return DeltaFlags::CONTENT;
		};
		if self.properties != old.properties || !self.same_source(old) {
			DeltaFlags::CONTENT
		} else {
			DeltaFlags::empty()
		}
	}

	fn as_any(&self) -> &dyn Any {
		self
	}
}
