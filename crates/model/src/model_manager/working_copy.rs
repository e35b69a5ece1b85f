use std::sync::Arc;

use handly_buffer::TextBuffer;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::ModelManager;
use crate::delta::{DeltaFlags, ElementDeltaBuilder};
use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::notification::EventKinds;
use crate::recorder::ElementChangeRecorder;
use crate::working_copy::{ReconcileOutcome, WorkingCopyCallback, WorkingCopyInfo};

impl ModelManager {
	/// Makes the source file `file` a working copy backed by `buffer`.
	///
	/// The first call registers the working copy, builds its structure from
	/// the buffer, runs `on_init` and fires `POST_CHANGE` with
	/// [`DeltaFlags::WORKING_COPY`]; it returns `true`. Later calls take
	/// another reference, wait for that initialization to finish and return
	/// `false`. If building or `on_init` fails, the working copy is
	/// unregistered and the error returned; callers that were waiting on it
	/// retry with their own buffer and callback.
	pub fn become_working_copy(
		&self,
		file: &Handle,
		buffer: Arc<TextBuffer>,
		callback: Arc<dyn WorkingCopyCallback>,
		cancel: &CancellationToken,
	) -> Result<bool> {
		if !file.is_openable() {
			return Err(Error::illegal_argument(format!(
				"{file:?} is not an openable source file"
			)));
		}
		loop {
			let existed = self.elements.is_cached(file) || self.model.validate_existence(file).is_ok();
			let (info, created) = self.elements.put_working_copy_info_if_absent(
				file,
				Arc::clone(&buffer),
				Arc::clone(&callback),
			);
			if !created {
				if info.wait_for_init() {
					debug!(file = ?file, refs = info.ref_count(), "Already a working copy");
					return Ok(false);
				}
				self.elements.release_unregistered(&info)?;
				debug!(file = ?file, "Concurrent working copy initialization failed, retrying");
				continue;
			}

			if let Err(error) = self.init_working_copy(&info, cancel) {
				warn!(file = ?file, %error, "Working copy initialization failed");
				self.elements.discard_working_copy_info(&info);
				info.finish_init(false);
				self.elements.release_unregistered(&info)?;
				return Err(error);
			}
			info.finish_init(true);
			debug!(file = ?file, buffer = %info.buffer().id(), "Became working copy");

			let mut builder = ElementDeltaBuilder::new(file.clone());
			if existed {
				builder.changed(file, DeltaFlags::WORKING_COPY)?;
			} else {
				builder.added_with(file, DeltaFlags::WORKING_COPY)?;
			}
			self.fire(EventKinds::POST_CHANGE, builder.build());
			return Ok(true);
		}
	}

	fn init_working_copy(&self, info: &Arc<WorkingCopyInfo>, cancel: &CancellationToken) -> Result<()> {
		let file = info.element();
		let snapshot = info.buffer().snapshot();
		let version = snapshot.version();
		let bodies = self.build(file, cancel, Some(snapshot))?;
		if !bodies.contains_key(file) {
			return Err(Error::DoesNotExist(file.clone()));
		}
		self.elements.put(file, bodies);
		*info.reconcile_lock() = Some(version);
		info.callback().on_init(info)
	}

	/// Drops one reference on the working copy of `file`.
	///
	/// Returns `true` if this was the last reference: the working copy is
	/// then disposed and `POST_CHANGE` fired, describing the file as removed
	/// if its underlying resource no longer exists.
	pub fn release_working_copy(&self, file: &Handle) -> Result<bool> {
		let Some(info) = self.elements.release_working_copy_info(file)? else {
			return Ok(false);
		};
		let exists = self.model.validate_existence(file).is_ok();
		debug!(file = ?file, buffer = %info.buffer().id(), exists, "Working copy released");

		let mut builder = ElementDeltaBuilder::new(file.clone());
		if exists {
			builder.changed(file, DeltaFlags::WORKING_COPY)?;
		} else {
			builder.removed_with(file, DeltaFlags::WORKING_COPY)?;
		}
		self.fire(EventKinds::POST_CHANGE, builder.build());
		Ok(true)
	}

	/// Takes a reference on the existing working copy of `file`.
	///
	/// Returns `None` if `file` is not a working copy. Blocks while a
	/// concurrent `become_working_copy` is still initializing it, and returns
	/// `None` if that initialization failed. A returned working copy must be
	/// released with [`ModelManager::release_working_copy`].
	pub fn acquire_existing_working_copy(&self, file: &Handle) -> Option<Arc<WorkingCopyInfo>> {
		let info = self.elements.get_working_copy_info(file)?;
		if info.wait_for_init() {
			return Some(info);
		}
		if let Err(error) = self.elements.release_unregistered(&info) {
			warn!(file = ?file, %error, "Releasing failed working copy");
		}
		None
	}

	/// Returns true if `file` is currently a working copy.
	pub fn is_working_copy(&self, file: &Handle) -> bool {
		self.elements
			.peek_at_working_copy_info(file)
			.is_some_and(|info| !info.is_disposed())
	}

	/// Returns the buffer of the working copy of `file`.
	pub fn working_copy_buffer(&self, file: &Handle) -> Option<Arc<TextBuffer>> {
		self.elements
			.peek_at_working_copy_info(file)
			.map(|info| Arc::clone(info.buffer()))
	}

	/// Returns every element currently in working-copy mode.
	pub fn working_copies(&self) -> Vec<Handle> {
		self.elements.working_copies()
	}

	/// Rebuilds the structure of the working copy `file` from its buffer and
	/// fires `POST_RECONCILE` with the resulting delta if it is not empty.
	///
	/// Does nothing if `file` is not a working copy, or if the buffer did not
	/// change since the last reconcile and `force` is false.
	pub fn reconcile(&self, file: &Handle, force: bool, cancel: &CancellationToken) -> Result<ReconcileOutcome> {
		let Some(info) = self.elements.peek_at_working_copy_info(file) else {
			return Ok(ReconcileOutcome::default());
		};
		if !info.wait_for_init() {
			return Ok(ReconcileOutcome::default());
		}

		let delta = {
			let mut reconciled = info.reconcile_lock();
			let snapshot = info.buffer().snapshot();
			if !force && *reconciled == Some(snapshot.version()) {
				debug!(file = ?file, version = snapshot.version(), "Reconcile skipped, buffer unmodified");
				return Ok(ReconcileOutcome::default());
			}

			if !self.elements.is_registered(&info) {
				debug!(file = ?file, "Working copy released before reconcile");
				return Ok(ReconcileOutcome::default());
			}

			let mut recorder = ElementChangeRecorder::new();
			recorder.begin_recording(&self.elements, file, None, self.config.reconcile_depth)?;
			let version = snapshot.version();
			let bodies = self.build(file, cancel, Some(snapshot))?;
			if info.is_disposed() || !self.elements.is_registered(&info) {
				debug!(file = ?file, "Working copy released during reconcile, discarding structure");
				return Ok(ReconcileOutcome::default());
			}
			self.elements.put(file, bodies);
			let delta = recorder.end_recording(&self.elements)?.build();
			*reconciled = Some(version);
			delta
		};

		info.callback().on_reconcile(&info, &delta);
		if delta.is_empty() {
			debug!(file = ?file, "Reconciled without changes");
			return Ok(ReconcileOutcome {
				reconciled: true,
				delta: None,
			});
		}
		debug!(file = ?file, "Reconciled, firing delta");
		self.fire(EventKinds::POST_RECONCILE, delta.clone());
		Ok(ReconcileOutcome {
			reconciled: true,
			delta: Some(delta),
		})
	}
}
