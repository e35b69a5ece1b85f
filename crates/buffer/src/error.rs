use thiserror::Error;

/// Errors raised by buffer operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BufferError {
	/// An edit addresses characters past the end of the buffer.
	#[error("edit range {start}..{end} out of bounds (buffer length {len})")]
	OutOfBounds {
		/// Start of the offending edit.
		start: usize,
		/// End of the offending edit.
		end: usize,
		/// Buffer length in characters.
		len: usize,
	},

	/// Edits within one change must be sorted and must not overlap.
	#[error("edits overlap or are out of order at offset {0}")]
	Overlapping(usize),

	/// An edit has `start > end`.
	#[error("inverted edit range {start}..{end}")]
	Inverted {
		/// Start of the offending edit.
		start: usize,
		/// End of the offending edit.
		end: usize,
	},

	/// The change was computed against an older buffer version.
	#[error("change based on version {expected}, buffer is at {actual}")]
	StaleBase {
		/// Version the change was computed against.
		expected: u64,
		/// Current buffer version.
		actual: u64,
	},

	/// `release` was called more often than `add_ref`.
	#[error("buffer {0} has no outstanding references")]
	NotReferenced(u64),
}

/// Result type for buffer operations.
pub type Result<T> = std::result::Result<T, BufferError>;
