//! The body cache and working-copy registry of one model instance.
//!
//! Every mutation is serialized behind one lock. Builds of openable elements
//! are claimed per element so that concurrent openers wait for the winner
//! instead of building twice. Eviction listeners run after the lock is
//! released.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

use handly_buffer::TextBuffer;
use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::body::ElementBody;
use crate::cache::{ElementCache, Evicted, TemporaryCache, temporary};
use crate::elements;
use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::working_copy::{WorkingCopyCallback, WorkingCopyInfo};

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

/// Receives bodies dropped by cache overflow.
pub trait EvictionListener: Send + Sync {
	/// Called once per evicted element, outside the manager lock.
	fn on_evicted(&self, element: &Handle, body: &Arc<dyn ElementBody>);
}

struct State {
	cache: ElementCache,
	working_copies: FxHashMap<Handle, Arc<WorkingCopyInfo>>,
	building: FxHashMap<Handle, ThreadId>,
}

/// Coordinates bodies and working copies for one model.
pub struct ElementManager {
	id: u64,
	state: Mutex<State>,
	build_done: Condvar,
	listener: Option<Arc<dyn EvictionListener>>,
}

/// Outcome of [`ElementManager::claim_build`].
pub enum BuildClaim<'a> {
	/// Another build committed a body meanwhile.
	Existing(Arc<dyn ElementBody>),
	/// The caller owns the build until the guard drops.
	Claimed(BuildGuard<'a>),
}

/// Marks an element as being built by the current thread.
pub struct BuildGuard<'a> {
	manager: &'a ElementManager,
	element: Handle,
}

impl Drop for BuildGuard<'_> {
	fn drop(&mut self) {
		self.manager.state.lock().building.remove(&self.element);
		self.manager.build_done.notify_all();
	}
}

impl ElementManager {
	/// Creates a manager whose cache holds `cache`.
	pub fn new(cache: ElementCache) -> Self {
		Self {
			id: NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed),
			state: Mutex::new(State {
				cache,
				working_copies: FxHashMap::default(),
				building: FxHashMap::default(),
			}),
			build_done: Condvar::new(),
			listener: None,
		}
	}

	/// Sets the listener notified of overflow evictions.
	pub fn with_eviction_listener(mut self, listener: Arc<dyn EvictionListener>) -> Self {
		self.listener = Some(listener);
		self
	}

	/// Returns the body of `element`, consulting the current thread's
	/// temporary cache first. Never builds.
	pub fn get(&self, element: &Handle) -> Option<Arc<dyn ElementBody>> {
		temporary::lookup(self.id, element).or_else(|| self.state.lock().cache.get(element))
	}

	/// Like [`ElementManager::get`] but leaves recency untouched.
	pub fn peek(&self, element: &Handle) -> Option<Arc<dyn ElementBody>> {
		temporary::lookup(self.id, element).or_else(|| self.state.lock().cache.peek(element))
	}

	/// Returns true if the main cache holds a body for `element`.
	pub fn is_cached(&self, element: &Handle) -> bool {
		self.state.lock().cache.contains(element)
	}

	/// Commits a freshly built subtree of `element` in one step.
	///
	/// Bodies of non-openable descendants left over from an earlier build of
	/// `element` are dropped first.
	pub fn put(&self, element: &Handle, bodies: FxHashMap<Handle, Arc<dyn ElementBody>>) {
		let evicted = {
			let mut state = self.state.lock();
			Self::put_locked(&mut state, element, bodies)
		};
		self.notify_evicted(evicted);
	}

	/// Commits like [`ElementManager::put`] unless `element` already has a
	/// body, which is then returned and the map discarded.
	pub fn put_if_absent(
		&self,
		element: &Handle,
		bodies: FxHashMap<Handle, Arc<dyn ElementBody>>,
	) -> Option<Arc<dyn ElementBody>> {
		let evicted = {
			let mut state = self.state.lock();
			if let Some(existing) = state.cache.get(element) {
				trace!(element = ?element, "Build lost the race, keeping committed body");
				return Some(existing);
			}
			Self::put_locked(&mut state, element, bodies)
		};
		self.notify_evicted(evicted);
		None
	}

	/// Removes the body of `element` only.
	pub fn remove(&self, element: &Handle) -> Option<Arc<dyn ElementBody>> {
		self.state.lock().cache.remove(element)
	}

	/// Removes the body of `element` and of every non-openable descendant
	/// that belongs to it. Returns the removed elements.
	pub fn remove_subtree(&self, element: &Handle) -> Vec<Handle> {
		Self::remove_subtree_locked(&mut self.state.lock(), element)
	}

	/// Claims the build of `element` for the current thread.
	///
	/// Blocks while another thread builds the same element and returns its
	/// body if that build committed one. A thread reclaiming an element it is
	/// already building gets [`Error::IllegalState`].
	pub fn claim_build(&self, element: &Handle) -> Result<BuildClaim<'_>> {
		self.claim(element, true)
	}

	/// Claims a rebuild of `element` even though it has a cached body.
	///
	/// Blocks while another thread builds the same element.
	pub fn claim_rebuild(&self, element: &Handle) -> Result<BuildGuard<'_>> {
		match self.claim(element, false)? {
			BuildClaim::Claimed(guard) => Ok(guard),
			BuildClaim::Existing(_) => Err(Error::illegal_state(format!("rebuild of {element:?} not claimed"))),
		}
	}

	fn claim(&self, element: &Handle, reuse_cached: bool) -> Result<BuildClaim<'_>> {
		let me = thread::current().id();
		let mut state = self.state.lock();
		loop {
			if reuse_cached && let Some(body) = state.cache.get(element) {
				return Ok(BuildClaim::Existing(body));
			}
			match state.building.get(element) {
				Some(owner) if *owner == me => {
					return Err(Error::illegal_state(format!("recursive build of {element:?}")));
				}
				Some(_) => {
					trace!(element = ?element, "Waiting for concurrent build");
					self.build_done.wait(&mut state);
				}
				None => {
					state.building.insert(element.clone(), me);
					return Ok(BuildClaim::Claimed(BuildGuard {
						manager: self,
						element: element.clone(),
					}));
				}
			}
		}
	}

	/// Pushes a temporary cache for the current thread.
	pub fn push_temporary_cache(&self, cache: TemporaryCache) {
		temporary::push(self.id, cache);
	}

	/// Pops the current thread's most recent temporary cache.
	///
	/// Fails with [`Error::IllegalState`] if none was pushed.
	pub fn pop_temporary_cache(&self) -> Result<TemporaryCache> {
		temporary::pop(self.id)
	}

	/// Raises the cache capacity on behalf of the build of `root`.
	pub fn ensure_max_size(&self, min_size: usize, root: &Handle) {
		self.state.lock().cache.ensure_max_size(min_size, root);
	}

	/// Restores the cache capacity if `root` owns the raised headroom.
	pub fn reset_max_size(&self, size: usize, root: &Handle) {
		let evicted = {
			let mut state = self.state.lock();
			let evicted = state.cache.reset_max_size(size, root);
			Self::drop_dependents(&mut state, evicted)
		};
		self.notify_evicted(evicted);
	}

	/// Sets the cache capacity.
	pub fn set_max_size(&self, size: usize) {
		let evicted = {
			let mut state = self.state.lock();
			let evicted = state.cache.set_max_size(size);
			Self::drop_dependents(&mut state, evicted)
		};
		self.notify_evicted(evicted);
	}

	/// Sets the eviction survivor ratio.
	pub fn set_load_factor(&self, load_factor: f64) {
		self.state.lock().cache.set_load_factor(load_factor);
	}

	/// Returns the cache capacity.
	pub fn max_size(&self) -> usize {
		self.state.lock().cache.max_size()
	}

	/// Returns the number of cached bodies.
	pub fn cached_count(&self) -> usize {
		self.state.lock().cache.len()
	}

	/// Returns the number of overflow evictions so far.
	pub fn overflow_count(&self) -> u64 {
		self.state.lock().cache.overflow_count()
	}

	/// Registers a working copy for `element`, or takes one more reference on
	/// the existing registration. Returns the info and whether it was created.
	pub fn put_working_copy_info_if_absent(
		&self,
		element: &Handle,
		buffer: Arc<TextBuffer>,
		callback: Arc<dyn WorkingCopyCallback>,
	) -> (Arc<WorkingCopyInfo>, bool) {
		let mut state = self.state.lock();
		if let Some(info) = state.working_copies.get(element) {
			let refs = info.acquire();
			trace!(element = ?element, refs, "Working copy acquired");
			return (Arc::clone(info), false);
		}
		let info = Arc::new(WorkingCopyInfo::new(element.clone(), buffer, callback));
		info.acquire();
		state.working_copies.insert(element.clone(), Arc::clone(&info));
		state.cache.pin(element.clone());
		debug!(element = ?element, buffer = %info.buffer().id(), "Working copy registered");
		(info, true)
	}

	/// Takes one more reference on the working copy of `element`.
	pub fn get_working_copy_info(&self, element: &Handle) -> Option<Arc<WorkingCopyInfo>> {
		let state = self.state.lock();
		let info = state.working_copies.get(element)?;
		info.acquire();
		Some(Arc::clone(info))
	}

	/// Returns the working copy of `element` without taking a reference.
	pub fn peek_at_working_copy_info(&self, element: &Handle) -> Option<Arc<WorkingCopyInfo>> {
		self.state.lock().working_copies.get(element).cloned()
	}

	/// Returns true if `info` is the current registration of its element.
	pub fn is_registered(&self, info: &Arc<WorkingCopyInfo>) -> bool {
		self.state
			.lock()
			.working_copies
			.get(info.element())
			.is_some_and(|current| Arc::ptr_eq(current, info))
	}

	/// Drops one reference on the working copy of `element`.
	///
	/// When the last reference goes the registration and the element's
	/// bodies are removed, the info is disposed, and it is returned so the
	/// caller can finish the transition. Returns `None` otherwise. Waits for
	/// a reconcile of the working copy in progress to commit first.
	pub fn release_working_copy_info(&self, element: &Handle) -> Result<Option<Arc<WorkingCopyInfo>>> {
		loop {
			let info = self
				.peek_at_working_copy_info(element)
				.ok_or_else(|| Error::illegal_state(format!("{element:?} is not a working copy")))?;
			let reconciling = info.reconcile_lock();
			{
				let mut state = self.state.lock();
				if !state
					.working_copies
					.get(element)
					.is_some_and(|current| Arc::ptr_eq(current, &info))
				{
					trace!(element = ?element, "Working copy replaced during release, retrying");
					continue;
				}
				let refs = info.release()?;
				trace!(element = ?element, refs, "Working copy released");
				if refs > 0 {
					return Ok(None);
				}
				state.working_copies.remove(element);
				state.cache.unpin(element);
				Self::remove_subtree_locked(&mut state, element);
			}
			drop(reconciling);
			debug!(element = ?element, "Working copy disposed");
			info.dispose();
			return Ok(Some(info));
		}
	}

	/// Unregisters `info` after its initialization failed and drops the
	/// element's bodies. References still held on it are dropped with
	/// [`ElementManager::release_unregistered`].
	pub fn discard_working_copy_info(&self, info: &Arc<WorkingCopyInfo>) {
		let element = info.element();
		let mut state = self.state.lock();
		if !state
			.working_copies
			.get(element)
			.is_some_and(|current| Arc::ptr_eq(current, info))
		{
			return;
		}
		state.working_copies.remove(element);
		state.cache.unpin(element);
		Self::remove_subtree_locked(&mut state, element);
		debug!(element = ?element, "Failed working copy unregistered");
	}

	/// Drops one reference on an unregistered working copy, disposing it
	/// when that was the last one. Returns true if it was disposed.
	pub fn release_unregistered(&self, info: &WorkingCopyInfo) -> Result<bool> {
		let refs = info.release()?;
		trace!(element = ?info.element(), refs, "Unregistered working copy released");
		if refs > 0 {
			return Ok(false);
		}
		info.dispose();
		Ok(true)
	}

	/// Returns the elements currently registered as working copies.
	pub fn working_copies(&self) -> Vec<Handle> {
		self.state.lock().working_copies.keys().cloned().collect()
	}

	fn put_locked(state: &mut State, element: &Handle, bodies: FxHashMap<Handle, Arc<dyn ElementBody>>) -> Vec<Evicted> {
		let stale: Vec<Handle> = state
			.cache
			.keys_matching(|k| belongs_to(k, element) && !bodies.contains_key(k));
		for key in &stale {
			state.cache.remove(key);
		}
		trace!(element = ?element, bodies = bodies.len(), dropped = stale.len(), "Committing bodies");
		let evicted = state.cache.put_all(bodies);
		Self::drop_dependents(state, evicted)
	}

	fn remove_subtree_locked(state: &mut State, element: &Handle) -> Vec<Handle> {
		let mut removed = state.cache.keys_matching(|k| belongs_to(k, element));
		if state.cache.remove(element).is_some() {
			removed.push(element.clone());
		}
		for key in &removed {
			state.cache.remove(key);
		}
		removed
	}

	/// Evicting an openable element also drops the bodies of its
	/// non-openable descendants.
	fn drop_dependents(state: &mut State, evicted: Vec<Evicted>) -> Vec<Evicted> {
		for (element, _) in &evicted {
			if element.is_openable() {
				for key in state.cache.keys_matching(|k| belongs_to(k, element)) {
					state.cache.remove(&key);
				}
			}
		}
		evicted
	}

	fn notify_evicted(&self, evicted: Vec<Evicted>) {
		if evicted.is_empty() {
			return;
		}
		let Some(listener) = &self.listener else {
			return;
		};
		for (element, body) in &evicted {
			listener.on_evicted(element, body);
		}
	}
}

impl std::fmt::Debug for ElementManager {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.state.lock();
		f.debug_struct("ElementManager")
			.field("id", &self.id)
			.field("cache", &state.cache)
			.field("working_copies", &state.working_copies.len())
			.field("building", &state.building.len())
			.finish()
	}
}

/// Returns true if `element` is a non-openable descendant whose nearest
/// openable ancestor is `owner`.
fn belongs_to(element: &Handle, owner: &Handle) -> bool {
	!element.is_openable()
		&& elements::ancestors(element)
			.find(|a| a.is_openable())
			.is_some_and(|o| o.equals_along_same_parent_chain(owner))
}

#[cfg(test)]
mod tests;
