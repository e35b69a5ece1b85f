//! Working-copy bookkeeping.
//!
//! A working copy is a source file whose [`TextBuffer`] rather than the
//! resource on disk is the source of truth. The element manager keeps one
//! [`WorkingCopyInfo`] per such file; its reference count mirrors the buffer's
//! reference count one to one.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use handly_buffer::TextBuffer;
use parking_lot::{Condvar, Mutex};

use crate::delta::ElementDelta;
use crate::error::{Error, Result};
use crate::handle::Handle;

/// Hooks run at working-copy lifecycle points.
pub trait WorkingCopyCallback: Send + Sync {
	/// Runs once the initial structure was built from the buffer.
	///
	/// An error is returned to the caller of `become_working_copy` after the
	/// working copy has been torn down again.
	fn on_init(&self, _info: &WorkingCopyInfo) -> Result<()> {
		Ok(())
	}

	/// Runs exactly once when the last reference is released.
	fn on_dispose(&self, _info: &WorkingCopyInfo) {}

	/// Observes the delta of a reconcile before it is fired.
	fn on_reconcile(&self, _info: &WorkingCopyInfo, _delta: &ElementDelta) {}
}

/// A callback that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultWorkingCopyCallback;

impl WorkingCopyCallback for DefaultWorkingCopyCallback {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitState {
	Pending,
	Ready,
	Failed,
}

/// Registry entry for one working copy.
pub struct WorkingCopyInfo {
	element: Handle,
	buffer: Arc<TextBuffer>,
	callback: Arc<dyn WorkingCopyCallback>,
	refs: AtomicUsize,
	init: Mutex<InitState>,
	init_done: Condvar,
	/// Buffer version the structure was last built from.
	reconciled: Mutex<Option<u64>>,
	disposed: AtomicBool,
}

impl WorkingCopyInfo {
	pub(crate) fn new(element: Handle, buffer: Arc<TextBuffer>, callback: Arc<dyn WorkingCopyCallback>) -> Self {
		Self {
			element,
			buffer,
			callback,
			refs: AtomicUsize::new(0),
			init: Mutex::new(InitState::Pending),
			init_done: Condvar::new(),
			reconciled: Mutex::new(None),
			disposed: AtomicBool::new(false),
		}
	}

	/// Returns the source-file element.
	pub fn element(&self) -> &Handle {
		&self.element
	}

	/// Returns the shared buffer.
	pub fn buffer(&self) -> &Arc<TextBuffer> {
		&self.buffer
	}

	/// Returns the current reference count.
	pub fn ref_count(&self) -> usize {
		self.refs.load(Ordering::Acquire)
	}

	/// Returns true once `on_init` ran successfully.
	pub fn is_initialized(&self) -> bool {
		*self.init.lock() == InitState::Ready
	}

	/// Returns true once the info was disposed.
	pub fn is_disposed(&self) -> bool {
		self.disposed.load(Ordering::Acquire)
	}

	pub(crate) fn callback(&self) -> &Arc<dyn WorkingCopyCallback> {
		&self.callback
	}

	pub(crate) fn acquire(&self) -> usize {
		self.buffer.add_ref();
		self.refs.fetch_add(1, Ordering::AcqRel) + 1
	}

	/// Decrements the count and releases one buffer reference, returning
	/// the new count.
	pub(crate) fn release(&self) -> Result<usize> {
		let previous = self
			.refs
			.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
			.map_err(|_| Error::illegal_state(format!("working copy {:?} is not referenced", self.element)))?;
		self.buffer.release()?;
		Ok(previous - 1)
	}

	pub(crate) fn finish_init(&self, ok: bool) {
		let mut state = self.init.lock();
		*state = if ok { InitState::Ready } else { InitState::Failed };
		self.init_done.notify_all();
	}

	/// Blocks until initialization finished; returns true on success.
	pub(crate) fn wait_for_init(&self) -> bool {
		let mut state = self.init.lock();
		while *state == InitState::Pending {
			self.init_done.wait(&mut state);
		}
		*state == InitState::Ready
	}

	/// Runs `on_dispose` unless it already ran.
	pub(crate) fn dispose(&self) {
		if self.disposed.swap(true, Ordering::AcqRel) {
			return;
		}
		self.callback.on_dispose(self);
	}

	pub(crate) fn reconcile_lock(&self) -> parking_lot::MutexGuard<'_, Option<u64>> {
		self.reconciled.lock()
	}
}

impl fmt::Debug for WorkingCopyInfo {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WorkingCopyInfo")
			.field("element", &self.element)
			.field("buffer", &self.buffer.id())
			.field("refs", &self.ref_count())
			.field("init", &*self.init.lock())
			.field("disposed", &self.is_disposed())
			.finish()
	}
}

/// Result of [`crate::ModelManager::reconcile`].
#[derive(Debug, Default)]
pub struct ReconcileOutcome {
	/// False if the element is not a working copy or the buffer was
	/// unmodified and no force was requested.
	pub reconciled: bool,
	/// The delta fired with `POST_RECONCILE`, if it was non-empty.
	pub delta: Option<ElementDelta>,
}
