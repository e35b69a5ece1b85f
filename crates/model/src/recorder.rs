//! Body-tree diffing.
//!
//! [`ElementChangeRecorder`] snapshots the bodies of an element's subtree when
//! recording begins and diffs them against the current bodies when it ends.
//! Down to `max_depth` levels below the input element the diff is fine
//! grained: child additions, removals and reorders are reported individually
//! and nodes whose children were inspected carry [`DeltaFlags::FINE_GRAINED`].
//! At `max_depth` any difference anywhere in a subtree collapses into a
//! single [`DeltaFlags::CONTENT`] on the subtree root.

use std::collections::HashMap;
use std::hash::BuildHasher;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;

use crate::body::ElementBody;
use crate::delta::{DeltaFlags, ElementDeltaBuilder};
use crate::element_manager::ElementManager;
use crate::error::{Error, Result};
use crate::handle::Handle;

/// Where the recorder reads current bodies from.
pub trait BodySource {
	/// Returns the body of `element` without building it.
	fn body(&self, element: &Handle) -> Option<Arc<dyn ElementBody>>;
}

impl BodySource for ElementManager {
	fn body(&self, element: &Handle) -> Option<Arc<dyn ElementBody>> {
		self.peek(element)
	}
}

impl<S: BuildHasher> BodySource for HashMap<Handle, Arc<dyn ElementBody>, S> {
	fn body(&self, element: &Handle) -> Option<Arc<dyn ElementBody>> {
		self.get(element).cloned()
	}
}

struct Recording {
	input: Handle,
	builder: ElementDeltaBuilder,
	max_depth: usize,
	old: FxHashMap<Handle, Arc<dyn ElementBody>>,
}

/// Records the changes of one element's subtree between two points in time.
#[derive(Default)]
pub struct ElementChangeRecorder {
	recording: Option<Recording>,
}

impl ElementChangeRecorder {
	/// Creates an idle recorder.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns true between `begin_recording` and `end_recording`.
	pub fn is_recording(&self) -> bool {
		self.recording.is_some()
	}

	/// Snapshots the subtree of `input`.
	///
	/// Changes go into `builder` when given, else into a new builder rooted
	/// at `input`. Fails if a recording is already in progress.
	pub fn begin_recording(
		&mut self,
		source: &dyn BodySource,
		input: &Handle,
		builder: Option<ElementDeltaBuilder>,
		max_depth: usize,
	) -> Result<()> {
		if self.recording.is_some() {
			return Err(Error::illegal_state("recording already in progress"));
		}
		let mut old = FxHashMap::default();
		snapshot(source, input, &mut old);
		trace!(input = ?input, bodies = old.len(), max_depth, "Recording started");
		self.recording = Some(Recording {
			input: input.clone(),
			builder: builder.unwrap_or_else(|| ElementDeltaBuilder::new(input.clone())),
			max_depth,
			old,
		});
		Ok(())
	}

	/// Diffs the current bodies against the snapshot and returns the builder
	/// holding the changes. Fails if no recording is in progress.
	pub fn end_recording(&mut self, source: &dyn BodySource) -> Result<ElementDeltaBuilder> {
		let Some(mut recording) = self.recording.take() else {
			return Err(Error::illegal_state("no recording in progress"));
		};
		let input = recording.input.clone();
		let mut diff = Diff {
			source,
			old: &recording.old,
			builder: &mut recording.builder,
			max_depth: recording.max_depth,
		};
		diff.find_changes(&input, 0)?;
		trace!(input = ?input, empty = recording.builder.is_empty(), "Recording ended");
		Ok(recording.builder)
	}
}

impl std::fmt::Debug for ElementChangeRecorder {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ElementChangeRecorder")
			.field("input", &self.recording.as_ref().map(|r| &r.input))
			.finish()
	}
}

fn snapshot(source: &dyn BodySource, element: &Handle, into: &mut FxHashMap<Handle, Arc<dyn ElementBody>>) {
	let Some(body) = source.body(element) else {
		return;
	};
	for child in body.children() {
		snapshot(source, child, into);
	}
	into.insert(element.clone(), body);
}

struct Diff<'a> {
	source: &'a dyn BodySource,
	old: &'a FxHashMap<Handle, Arc<dyn ElementBody>>,
	builder: &'a mut ElementDeltaBuilder,
	max_depth: usize,
}

impl Diff<'_> {
	/// Records the changes of `element`; returns true if there were any.
	fn find_changes(&mut self, element: &Handle, depth: usize) -> Result<bool> {
		let old = self.old.get(element).cloned();
		let new = self.source.body(element);
		let (old, new) = match (old, new) {
			(None, None) => return Ok(false),
			(None, Some(_)) => {
				self.builder.added(element)?;
				return Ok(true);
			}
			(Some(_), None) => {
				self.builder.removed(element)?;
				return Ok(true);
			}
			(Some(old), Some(new)) => (old, new),
		};

		if depth >= self.max_depth {
			if self.subtree_differs(&*old, &*new) {
				self.builder.changed(element, DeltaFlags::CONTENT)?;
				return Ok(true);
			}
			return Ok(false);
		}

		let mut changed = false;
		let content = new.find_content_change(&*old);
		if !content.is_empty() {
			self.builder.changed(element, content)?;
			changed = true;
		}

		let old_children = old.children();
		let new_children = new.children();
		let old_set: FxHashSet<&Handle> = old_children.iter().collect();
		let new_set: FxHashSet<&Handle> = new_children.iter().collect();

		for child in old_children.iter().filter(|c| !new_set.contains(c)) {
			self.builder.removed(child)?;
			changed = true;
		}
		for child in new_children.iter().filter(|c| !old_set.contains(c)) {
			self.builder.added(child)?;
			changed = true;
		}

		let old_common: Vec<&Handle> = old_children.iter().filter(|c| new_set.contains(c)).collect();
		let new_common: Vec<&Handle> = new_children.iter().filter(|c| old_set.contains(c)).collect();
		let stable = longest_common_subsequence(&old_common, &new_common);
		for (i, child) in new_common.iter().enumerate() {
			if !stable.contains(&i) {
				self.builder.changed(child, DeltaFlags::REORDER)?;
				changed = true;
			}
		}

		for child in new_common {
			if self.is_unknown(child) {
				continue;
			}
			if self.find_changes(child, depth + 1)? {
				changed = true;
			}
		}

		if changed {
			self.builder.changed(element, DeltaFlags::FINE_GRAINED)?;
		}
		Ok(changed)
	}

	/// Openable children without a body on either side cannot be compared.
	fn is_unknown(&self, child: &Handle) -> bool {
		child.is_openable() && (!self.old.contains_key(child) || self.source.body(child).is_none())
	}

	fn subtree_differs(&self, old: &dyn ElementBody, new: &dyn ElementBody) -> bool {
		if !new.find_content_change(old).is_empty() || old.children() != new.children() {
			return true;
		}
		for child in new.children() {
			if self.is_unknown(child) {
				continue;
			}
			match (self.old.get(child), self.source.body(child)) {
				(None, None) => {}
				(Some(o), Some(n)) => {
					if self.subtree_differs(&**o, &*n) {
						return true;
					}
				}
				_ => return true,
			}
		}
		false
	}
}

/// Returns the indices into `new` of a longest common subsequence of `old`
/// and `new`.
fn longest_common_subsequence(old: &[&Handle], new: &[&Handle]) -> FxHashSet<usize> {
	let (n, m) = (old.len(), new.len());
	let mut table = vec![vec![0usize; m + 1]; n + 1];
	for i in (0..n).rev() {
		for j in (0..m).rev() {
			table[i][j] = if old[i] == new[j] {
				table[i + 1][j + 1] + 1
			} else {
				table[i + 1][j].max(table[i][j + 1])
			};
		}
	}
	let mut stable = FxHashSet::default();
	let (mut i, mut j) = (0, 0);
	while i < n && j < m {
		if old[i] == new[j] {
			stable.insert(j);
			i += 1;
			j += 1;
		} else if table[i + 1][j] >= table[i][j + 1] {
			i += 1;
		} else {
			j += 1;
		}
	}
	stable
}
