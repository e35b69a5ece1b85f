//! Thread-confined temporary caches.
//!
//! While an element is being built, the bodies it has produced so far live in
//! a new-elements map that is not yet committed. Pushing that map as a
//! temporary cache lets lookups on the building thread see those bodies
//! before the commit. Stacks are per thread and per cache owner, so two
//! element managers never observe each other's builds.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::body::ElementBody;
use crate::error::{Error, Result};
use crate::handle::Handle;

/// A new-elements map shared between a build and the temporary-cache stack.
pub type TemporaryCache = Rc<RefCell<FxHashMap<Handle, Arc<dyn ElementBody>>>>;

thread_local! {
	static STACKS: RefCell<FxHashMap<u64, Vec<TemporaryCache>>> = RefCell::new(FxHashMap::default());
}

/// Pushes `cache` for `owner` on the current thread.
pub(crate) fn push(owner: u64, cache: TemporaryCache) {
	STACKS.with(|stacks| stacks.borrow_mut().entry(owner).or_default().push(cache));
}

/// Pops the most recently pushed cache of `owner` on the current thread.
pub(crate) fn pop(owner: u64) -> Result<TemporaryCache> {
	STACKS.with(|stacks| {
		let mut stacks = stacks.borrow_mut();
		let stack = stacks.get_mut(&owner);
		let cache = stack.and_then(Vec::pop);
		if stacks.get(&owner).is_some_and(Vec::is_empty) {
			stacks.remove(&owner);
		}
		cache.ok_or_else(|| Error::illegal_state("temporary cache stack is empty"))
	})
}

/// Looks `element` up in the top temporary cache of `owner`.
pub(crate) fn lookup(owner: u64, element: &Handle) -> Option<Arc<dyn ElementBody>> {
	STACKS.with(|stacks| {
		let stacks = stacks.borrow();
		let top = stacks.get(&owner)?.last()?;
		top.borrow().get(element).cloned()
	})
}

/// Returns the depth of the stack of `owner` on the current thread.
pub(crate) fn depth(owner: u64) -> usize {
	STACKS.with(|stacks| stacks.borrow().get(&owner).map_or(0, Vec::len))
}
