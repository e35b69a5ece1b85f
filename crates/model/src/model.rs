//! The contract a hosting model implements.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use handly_buffer::Snapshot;
use rustc_hash::FxHashMap;
use tokio_util::sync::CancellationToken;

use crate::body::ElementBody;
use crate::cache::TemporaryCache;
use crate::error::{Error, Result};
use crate::handle::Handle;

/// Why an element's body is being dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseHint {
	/// A caller closed the element.
	Explicit,
	/// The body cache evicted the element.
	CacheOverflow,
}

/// A hosting model: the element kinds of one language or resource tree and
/// the knowledge of how to build their bodies.
pub trait Model: Send + Sync + 'static {
	/// Checks that the resource underlying `element` exists.
	///
	/// Returns [`Error::DoesNotExist`] when it does not.
	fn validate_existence(&self, element: &Handle) -> Result<()>;

	/// Builds the body of the openable `element` into `ctx`.
	///
	/// Must put a body for `element` itself and may put bodies for
	/// descendants built along the way. Long builds should call
	/// [`BuildContext::check_canceled`] between children.
	fn build_structure(&self, element: &Handle, ctx: &mut BuildContext<'_>) -> Result<()>;

	/// Called after the body of `element` was dropped.
	fn on_close(&self, _element: &Handle, _hint: CloseHint) {}
}

/// The new-elements map of one build, plus what the build may consult.
pub struct BuildContext<'a> {
	element: Handle,
	bodies: TemporaryCache,
	cancel: &'a CancellationToken,
	snapshot: Option<Snapshot>,
}

impl<'a> BuildContext<'a> {
	pub(crate) fn new(element: Handle, cancel: &'a CancellationToken, snapshot: Option<Snapshot>) -> Self {
		Self {
			element,
			bodies: Rc::new(RefCell::new(FxHashMap::default())),
			cancel,
			snapshot,
		}
	}

	/// Returns the element being built.
	pub fn element(&self) -> &Handle {
		&self.element
	}

	/// Records the body of `element`.
	pub fn put(&mut self, element: Handle, body: impl ElementBody) {
		self.bodies.borrow_mut().insert(element, Arc::new(body));
	}

	/// Returns true if a body was already recorded for `element`.
	pub fn contains(&self, element: &Handle) -> bool {
		self.bodies.borrow().contains_key(element)
	}

	/// Returns the number of recorded bodies.
	pub fn len(&self) -> usize {
		self.bodies.borrow().len()
	}

	/// Returns true if nothing was recorded yet.
	pub fn is_empty(&self) -> bool {
		self.bodies.borrow().is_empty()
	}

	/// Fails with [`Error::Canceled`] once the build's token is tripped.
	pub fn check_canceled(&self) -> Result<()> {
		if self.cancel.is_cancelled() {
			Err(Error::Canceled)
		} else {
			Ok(())
		}
	}

	/// Returns the cancellation token of the build.
	pub fn cancel_token(&self) -> &CancellationToken {
		self.cancel
	}

	/// Returns the snapshot to build from, e.g. a working copy's buffer
	/// contents; `None` means read the underlying resource.
	pub fn snapshot(&self) -> Option<&Snapshot> {
		self.snapshot.as_ref()
	}

	pub(crate) fn temporary_cache(&self) -> TemporaryCache {
		Rc::clone(&self.bodies)
	}

	pub(crate) fn into_bodies(self) -> FxHashMap<Handle, Arc<dyn ElementBody>> {
		match Rc::try_unwrap(self.bodies) {
			Ok(cell) => cell.into_inner(),
			Err(shared) => shared.borrow().clone(),
		}
	}
}
