//! The bounded body cache.
//!
//! [`ElementCache`] is an LRU map from handles to committed bodies. Capacity
//! is soft: when an insertion pushes the live size over `max_size`, the least
//! recently used entries are evicted until `floor(max_size * load_factor)`
//! remain. Entries inserted by that same call and pinned subtrees (working
//! copies) are never evicted; evicted entries are returned so the owner can
//! notify the model. Evicting the owner of raised headroom restores the
//! capacity it replaced.
//!
//! Temporary caches shadow the main cache for one build on one thread; see
//! [`temporary`].

pub mod temporary;

use std::sync::Arc;

use lru::LruCache;
use rustc_hash::FxHashSet;
use tracing::{debug, trace};

pub use self::temporary::TemporaryCache;
use crate::body::ElementBody;
use crate::elements;
use crate::handle::Handle;

/// A body dropped from the cache.
pub type Evicted = (Handle, Arc<dyn ElementBody>);

/// Headroom raised by [`ElementCache::ensure_max_size`].
#[derive(Debug, Clone)]
struct Watermark {
	owner: Handle,
	previous: usize,
}

/// LRU cache of element bodies.
pub struct ElementCache {
	entries: LruCache<Handle, Arc<dyn ElementBody>>,
	max_size: usize,
	load_factor: f64,
	watermark: Option<Watermark>,
	overflow_count: u64,
	pinned: FxHashSet<Handle>,
}

impl ElementCache {
	/// Creates a cache with the given capacity and load factor.
	pub fn new(max_size: usize, load_factor: f64) -> Self {
		Self {
			entries: LruCache::unbounded(),
			max_size: max_size.max(1),
			load_factor: clamp_load_factor(load_factor),
			watermark: None,
			overflow_count: 0,
			pinned: FxHashSet::default(),
		}
	}

	/// Returns the body for `element`, marking it most recently used.
	pub fn get(&mut self, element: &Handle) -> Option<Arc<dyn ElementBody>> {
		self.entries.get(element).cloned()
	}

	/// Returns the body for `element` without touching recency.
	pub fn peek(&self, element: &Handle) -> Option<Arc<dyn ElementBody>> {
		self.entries.peek(element).cloned()
	}

	/// Returns true if a body is cached for `element`.
	pub fn contains(&self, element: &Handle) -> bool {
		self.entries.contains(element)
	}

	/// Inserts one body, returning whatever the insertion evicted.
	pub fn put(&mut self, element: Handle, body: Arc<dyn ElementBody>) -> Vec<Evicted> {
		self.put_all([(element, body)])
	}

	/// Inserts a batch of bodies as one insertion.
	///
	/// None of the inserted entries is evicted by this call, even if the batch
	/// alone exceeds the capacity.
	pub fn put_all(&mut self, bodies: impl IntoIterator<Item = Evicted>) -> Vec<Evicted> {
		let mut inserted = FxHashSet::default();
		for (element, body) in bodies {
			self.entries.put(element.clone(), body);
			inserted.insert(element);
		}
		self.shrink(&inserted)
	}

	/// Removes the body for `element` only, not its subtree.
	pub fn remove(&mut self, element: &Handle) -> Option<Arc<dyn ElementBody>> {
		self.entries.pop(element)
	}

	/// Returns the cached elements for which `predicate` holds.
	pub fn keys_matching(&self, mut predicate: impl FnMut(&Handle) -> bool) -> Vec<Handle> {
		self.entries.iter().map(|(k, _)| k).filter(|k| predicate(k)).cloned().collect()
	}

	/// Returns the number of cached bodies.
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	/// Returns true if no body is cached.
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Returns the current capacity.
	pub fn max_size(&self) -> usize {
		self.max_size
	}

	/// Returns the eviction survivor ratio.
	pub fn load_factor(&self) -> f64 {
		self.load_factor
	}

	/// Returns the number of bodies evicted by overflow so far.
	pub fn overflow_count(&self) -> u64 {
		self.overflow_count
	}

	/// Sets the capacity, evicting immediately when it shrinks below the
	/// live size.
	pub fn set_max_size(&mut self, max_size: usize) -> Vec<Evicted> {
		trace!(from = self.max_size, to = max_size, "Cache max size set");
		self.max_size = max_size.max(1);
		self.shrink(&FxHashSet::default())
	}

	/// Sets the survivor ratio used by the next eviction.
	pub fn set_load_factor(&mut self, load_factor: f64) {
		self.load_factor = clamp_load_factor(load_factor);
	}

	/// Raises the capacity to at least `min_size` on behalf of the build of
	/// `root`, which becomes the watermark owner.
	///
	/// A raise while another build owns the watermark transfers ownership to
	/// `root` and keeps the oldest remembered capacity.
	pub fn ensure_max_size(&mut self, min_size: usize, root: &Handle) {
		if self.max_size >= min_size {
			return;
		}
		let previous = self.watermark.as_ref().map_or(self.max_size, |w| w.previous);
		trace!(root = ?root, from = self.max_size, to = min_size, "Cache headroom raised");
		self.watermark = Some(Watermark {
			owner: root.clone(),
			previous,
		});
		self.max_size = min_size;
	}

	/// Sets the capacity back to `size` if `root` owns the watermark;
	/// otherwise does nothing.
	pub fn reset_max_size(&mut self, size: usize, root: &Handle) -> Vec<Evicted> {
		let owned = self
			.watermark
			.as_ref()
			.is_some_and(|w| w.owner.equals_along_same_parent_chain(root));
		if !owned {
			return Vec::new();
		}
		self.watermark = None;
		trace!(root = ?root, from = self.max_size, to = size, "Cache headroom reset");
		self.max_size = size.max(1);
		self.shrink(&FxHashSet::default())
	}

	/// Returns the capacity remembered by the current watermark, if any.
	pub fn watermark_previous(&self) -> Option<usize> {
		self.watermark.as_ref().map(|w| w.previous)
	}

	/// Protects `root` and its whole subtree from eviction.
	pub fn pin(&mut self, root: Handle) {
		self.pinned.insert(root);
	}

	/// Lifts the protection set by [`ElementCache::pin`].
	pub fn unpin(&mut self, root: &Handle) {
		self.pinned.remove(root);
	}

	/// Returns true if `element` or one of its ancestors is pinned.
	pub fn is_pinned(&self, element: &Handle) -> bool {
		if self.pinned.is_empty() {
			return false;
		}
		self.pinned.contains(element) || elements::ancestors(element).any(|a| self.pinned.contains(a))
	}

	fn shrink(&mut self, protected: &FxHashSet<Handle>) -> Vec<Evicted> {
		let len = self.entries.len();
		if len <= self.max_size {
			return Vec::new();
		}
		let target = (self.max_size as f64 * self.load_factor).floor() as usize;
		let excess = len.saturating_sub(target);
		let victims: Vec<Handle> = self
			.entries
			.iter()
			.rev()
			.map(|(k, _)| k)
			.filter(|k| !protected.contains(*k) && !self.is_pinned(k))
			.take(excess)
			.cloned()
			.collect();

		let mut evicted = Vec::with_capacity(victims.len());
		for element in victims {
			if let Some(body) = self.entries.pop(&element) {
				evicted.push((element, body));
			}
		}
		self.overflow_count += evicted.len() as u64;
		if let Some(watermark) = &self.watermark
			&& evicted.iter().any(|(e, _)| e.equals_along_same_parent_chain(&watermark.owner))
		{
			trace!(owner = ?watermark.owner, to = watermark.previous, "Evicted headroom owner");
			self.max_size = watermark.previous;
			self.watermark = None;
		}
		debug!(
			evicted = evicted.len(),
			live = self.entries.len(),
			overflow_count = self.overflow_count,
			"Cache overflow"
		);
		evicted
	}
}

impl std::fmt::Debug for ElementCache {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ElementCache")
			.field("len", &self.entries.len())
			.field("max_size", &self.max_size)
			.field("load_factor", &self.load_factor)
			.field("watermark", &self.watermark)
			.field("overflow_count", &self.overflow_count)
			.finish()
	}
}

fn clamp_load_factor(load_factor: f64) -> f64 {
	if load_factor.is_finite() && load_factor > 0.0 {
		load_factor.min(1.0)
	} else {
		1.0
	}
}

#[cfg(test)]
mod tests;
