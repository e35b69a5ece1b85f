use std::fmt;

use ropey::Rope;

use crate::buffer::BufferId;

/// An immutable view of text at one point in time.
///
/// Cloning is cheap: the underlying rope shares its nodes.
#[derive(Clone)]
pub struct Snapshot {
	origin: Option<BufferId>,
	version: u64,
	text: Rope,
}

impl Snapshot {
	/// Creates a snapshot that belongs to no buffer, e.g. on-disk contents.
	pub fn detached(text: impl AsRef<str>) -> Self {
		Self {
			origin: None,
			version: 0,
			text: Rope::from_str(text.as_ref()),
		}
	}

	pub(crate) fn of_buffer(origin: BufferId, version: u64, text: Rope) -> Self {
		Self {
			origin: Some(origin),
			version,
			text,
		}
	}

	/// Returns the buffer this snapshot was taken from.
	pub fn origin(&self) -> Option<BufferId> {
		self.origin
	}

	/// Returns the buffer version at the time the snapshot was taken.
	pub fn version(&self) -> u64 {
		self.version
	}

	/// Returns the text rope.
	pub fn text(&self) -> &Rope {
		&self.text
	}

	/// Returns the full contents as a string.
	pub fn contents(&self) -> String {
		self.text.to_string()
	}

	/// Returns the length in characters.
	pub fn len_chars(&self) -> usize {
		self.text.len_chars()
	}

	/// Returns the characters in `[start, end)`, or `None` if out of bounds.
	pub fn slice(&self, start: usize, end: usize) -> Option<String> {
		if start > end || end > self.text.len_chars() {
			return None;
		}
		Some(self.text.slice(start..end).to_string())
	}

	/// Returns true if both snapshots denote the same text.
	///
	/// Snapshots of the same buffer version are equal without comparing
	/// contents.
	pub fn is_equal_to(&self, other: &Snapshot) -> bool {
		if let (Some(a), Some(b)) = (self.origin, other.origin)
			&& a == b
			&& self.version == other.version
		{
			return true;
		}
		self.text == other.text
	}
}

impl fmt::Debug for Snapshot {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Snapshot")
			.field("origin", &self.origin)
			.field("version", &self.version)
			.field("len_chars", &self.text.len_chars())
			.finish()
	}
}
