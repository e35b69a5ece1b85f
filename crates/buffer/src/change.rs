use ropey::Rope;

use crate::error::{BufferError, Result};

/// Replaces the character range `[start, end)` with `replacement`.
///
/// An empty replacement is a deletion, an empty range an insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
	/// Starting character index.
	pub start: usize,
	/// Ending character index (exclusive).
	pub end: usize,
	/// Replacement text.
	pub replacement: String,
}

impl Edit {
	/// Creates a replacement edit.
	pub fn replace(start: usize, end: usize, replacement: impl Into<String>) -> Self {
		Self {
			start,
			end,
			replacement: replacement.into(),
		}
	}

	/// Creates an insertion at `offset`.
	pub fn insert(offset: usize, text: impl Into<String>) -> Self {
		Self::replace(offset, offset, text)
	}

	/// Creates a deletion of `[start, end)`.
	pub fn delete(start: usize, end: usize) -> Self {
		Self::replace(start, end, String::new())
	}
}

/// A batch of edits applied to a buffer atomically.
///
/// Edit offsets refer to the text before any edit of the batch is applied,
/// so edits must be sorted by position and must not overlap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferChange {
	edits: Vec<Edit>,
	base_version: Option<u64>,
}

impl BufferChange {
	/// Creates a change from a list of edits.
	pub fn new(edits: Vec<Edit>) -> Self {
		Self {
			edits,
			base_version: None,
		}
	}

	/// Creates a change consisting of a single edit.
	pub fn single(edit: Edit) -> Self {
		Self::new(vec![edit])
	}

	/// Requires the buffer to be at `version` when the change is applied.
	pub fn with_base_version(mut self, version: u64) -> Self {
		self.base_version = Some(version);
		self
	}

	/// Returns the edits of this change.
	pub fn edits(&self) -> &[Edit] {
		&self.edits
	}

	/// Returns the version the change was computed against, if any.
	pub fn base_version(&self) -> Option<u64> {
		self.base_version
	}

	/// Returns true if the change has no edits.
	pub fn is_empty(&self) -> bool {
		self.edits.is_empty()
	}

	/// Checks that all edits are in bounds, sorted and disjoint.
	pub(crate) fn validate(&self, len: usize) -> Result<()> {
		let mut last_end = 0;
		for edit in &self.edits {
			if edit.start > edit.end {
				return Err(BufferError::Inverted {
					start: edit.start,
					end: edit.end,
				});
			}
			if edit.end > len {
				return Err(BufferError::OutOfBounds {
					start: edit.start,
					end: edit.end,
					len,
				});
			}
			if edit.start < last_end {
				return Err(BufferError::Overlapping(edit.start));
			}
			last_end = edit.end;
		}
		Ok(())
	}

	/// Applies the edits to `text`, back to front so earlier offsets stay valid.
	pub(crate) fn apply(&self, text: &mut Rope) {
		for edit in self.edits.iter().rev() {
			if edit.start < edit.end {
				text.remove(edit.start..edit.end);
			}
			if !edit.replacement.is_empty() {
				text.insert(edit.start, &edit.replacement);
			}
		}
	}
}
