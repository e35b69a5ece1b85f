use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::RwLock;
use ropey::Rope;
use tracing::trace;

use crate::change::BufferChange;
use crate::error::{BufferError, Result};
use crate::snapshot::Snapshot;

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique buffer identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

impl fmt::Display for BufferId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

struct BufferState {
	text: Rope,
	version: u64,
}

/// An editable, reference-counted text buffer.
///
/// Every successful change bumps the version. Owners that share the buffer
/// (for example the working copies of one source file) track their interest
/// with [`TextBuffer::add_ref`] and [`TextBuffer::release`]; the buffer itself
/// does not free anything when the count drops to zero.
pub struct TextBuffer {
	id: BufferId,
	state: RwLock<BufferState>,
	refs: AtomicUsize,
}

impl TextBuffer {
	/// Creates a buffer holding `text` at version 0 with no references.
	pub fn new(text: impl AsRef<str>) -> Self {
		Self {
			id: BufferId(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed)),
			state: RwLock::new(BufferState {
				text: Rope::from_str(text.as_ref()),
				version: 0,
			}),
			refs: AtomicUsize::new(0),
		}
	}

	/// Returns the buffer id.
	pub fn id(&self) -> BufferId {
		self.id
	}

	/// Returns the current version.
	pub fn version(&self) -> u64 {
		self.state.read().version
	}

	/// Returns the current contents.
	pub fn contents(&self) -> String {
		self.state.read().text.to_string()
	}

	/// Returns the current length in characters.
	pub fn len_chars(&self) -> usize {
		self.state.read().text.len_chars()
	}

	/// Takes an immutable snapshot of the current contents.
	pub fn snapshot(&self) -> Snapshot {
		let state = self.state.read();
		Snapshot::of_buffer(self.id, state.version, state.text.clone())
	}

	/// Applies a change and returns the new version.
	///
	/// The change is validated as a whole first; on error the buffer is left
	/// untouched.
	pub fn apply_change(&self, change: &BufferChange) -> Result<u64> {
		let mut state = self.state.write();
		if let Some(expected) = change.base_version()
			&& expected != state.version
		{
			return Err(BufferError::StaleBase {
				expected,
				actual: state.version,
			});
		}
		change.validate(state.text.len_chars())?;
		if change.is_empty() {
			return Ok(state.version);
		}
		change.apply(&mut state.text);
		state.version += 1;
		trace!(buffer = %self.id, version = state.version, edits = change.edits().len(), "Applied buffer change");
		Ok(state.version)
	}

	/// Replaces the whole contents and returns the new version.
	pub fn set_contents(&self, text: impl AsRef<str>) -> u64 {
		let mut state = self.state.write();
		state.text = Rope::from_str(text.as_ref());
		state.version += 1;
		state.version
	}

	/// Registers one more owner and returns the new count.
	pub fn add_ref(&self) -> usize {
		self.refs.fetch_add(1, Ordering::AcqRel) + 1
	}

	/// Drops one owner and returns the remaining count.
	pub fn release(&self) -> Result<usize> {
		self.refs
			.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
			.map(|prev| prev - 1)
			.map_err(|_| BufferError::NotReferenced(self.id.0))
	}

	/// Returns the number of registered owners.
	pub fn ref_count(&self) -> usize {
		self.refs.load(Ordering::Acquire)
	}
}

impl fmt::Debug for TextBuffer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = self.state.read();
		f.debug_struct("TextBuffer")
			.field("id", &self.id)
			.field("version", &state.version)
			.field("len_chars", &state.text.len_chars())
			.field("refs", &self.ref_count())
			.finish()
	}
}
