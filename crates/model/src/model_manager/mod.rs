//! Open/close and working-copy operations for one model.
//!
//! [`ModelManager`] is the owned service object a hosting model is driven
//! through. It opens elements on demand with at most one concurrent build
//! per openable element, closes them, answers source queries, and runs the
//! working-copy protocol.

mod working_copy;

use std::sync::Arc;

use handly_buffer::Snapshot;
use rustc_hash::FxHashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::body::ElementBody;
use crate::cache::ElementCache;
use crate::config::ModelConfig;
use crate::element_manager::{BuildClaim, ElementManager, EvictionListener};
use crate::elements;
use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::model::{BuildContext, CloseHint, Model};
use crate::notification::{ElementChangeEvent, ElementChangeListener, EventKinds, NotificationManager};

/// Forwards overflow evictions to the model as close hints.
struct OverflowCloser(Arc<dyn Model>);

impl EvictionListener for OverflowCloser {
	fn on_evicted(&self, element: &Handle, _body: &Arc<dyn ElementBody>) {
		trace!(element = ?element, "Closing evicted element");
		self.0.on_close(element, CloseHint::CacheOverflow);
	}
}

/// Drives one model instance.
pub struct ModelManager {
	model: Arc<dyn Model>,
	elements: ElementManager,
	notifications: NotificationManager,
	config: ModelConfig,
}

impl ModelManager {
	/// Creates a manager for `model`.
	pub fn new(model: Arc<dyn Model>, config: ModelConfig) -> Result<Self> {
		config.validate()?;
		let cache = ElementCache::new(config.cache_size, config.load_factor);
		let elements = ElementManager::new(cache).with_eviction_listener(Arc::new(OverflowCloser(Arc::clone(&model))));
		Ok(Self {
			model,
			elements,
			notifications: NotificationManager::new(),
			config,
		})
	}

	/// Returns the hosted model.
	pub fn model(&self) -> &Arc<dyn Model> {
		&self.model
	}

	/// Returns the element manager.
	pub fn elements(&self) -> &ElementManager {
		&self.elements
	}

	/// Returns the notification manager.
	pub fn notifications(&self) -> &NotificationManager {
		&self.notifications
	}

	/// Returns the configuration.
	pub fn config(&self) -> &ModelConfig {
		&self.config
	}

	/// Registers a change listener.
	pub fn add_listener(&self, listener: Arc<dyn ElementChangeListener>, kinds: EventKinds) {
		self.notifications.add_listener(listener, kinds);
	}

	/// Unregisters a change listener.
	pub fn remove_listener(&self, listener: &Arc<dyn ElementChangeListener>) {
		self.notifications.remove_listener(listener);
	}

	/// Returns the body of `element`, building it if needed.
	///
	/// Non-openable elements are materialized by opening their nearest
	/// openable ancestor. An openable element whose parent is not cached
	/// opens the parent first.
	pub fn open(&self, element: &Handle, cancel: &CancellationToken) -> Result<Arc<dyn ElementBody>> {
		if let Some(body) = self.elements.get(element) {
			return Ok(body);
		}
		if element.is_openable() {
			return self.open_openable(element, cancel);
		}

		let Some(owner) = elements::openable(element) else {
			return Err(Error::DoesNotExist(element.clone()));
		};
		let owner_body = self.open(owner, cancel)?;
		if let Some(body) = self.elements.get(element) {
			return Ok(body);
		}

		// The owner is cached but this descendant was evicted: rebuild the
		// owner from the snapshot its current structure came from.
		let _guard = self.elements.claim_rebuild(owner)?;
		if let Some(body) = self.elements.get(element) {
			return Ok(body);
		}
		let owner_body = self.elements.get(owner).unwrap_or(owner_body);
		let snapshot = match owner_body.as_source().and_then(|b| b.snapshot()) {
			Some(snapshot) => Some(snapshot.clone()),
			None => self.working_copy_snapshot(owner),
		};
		let bodies = self.build(owner, cancel, snapshot)?;
		let body = bodies
			.get(element)
			.cloned()
			.ok_or_else(|| Error::DoesNotExist(element.clone()))?;
		self.elements.put(owner, bodies);
		Ok(body)
	}

	fn open_openable(&self, element: &Handle, cancel: &CancellationToken) -> Result<Arc<dyn ElementBody>> {
		if let Some(parent) = element.parent()
			&& !self.elements.is_cached(parent)
		{
			self.open(parent, cancel)?;
			if let Some(body) = self.elements.get(element) {
				return Ok(body);
			}
		}

		let _guard = match self.elements.claim_build(element)? {
			BuildClaim::Existing(body) => return Ok(body),
			BuildClaim::Claimed(guard) => guard,
		};
		let bodies = self.build(element, cancel, self.working_copy_snapshot(element))?;
		let body = bodies
			.get(element)
			.cloned()
			.ok_or_else(|| Error::DoesNotExist(element.clone()))?;

		if self.config.child_headroom {
			let needed = ((1.0 + self.config.load_factor) * bodies.len() as f64).ceil() as usize + 1;
			self.elements.ensure_max_size(needed, element);
		}
		let count = bodies.len();
		if let Some(existing) = self.elements.put_if_absent(element, bodies) {
			return Ok(existing);
		}
		debug!(element = ?element, bodies = count, "Opened element");
		Ok(body)
	}

	/// Builds the structure of the openable `element` without committing it.
	fn build(
		&self,
		element: &Handle,
		cancel: &CancellationToken,
		snapshot: Option<Snapshot>,
	) -> Result<FxHashMap<Handle, Arc<dyn ElementBody>>> {
		if cancel.is_cancelled() {
			return Err(Error::Canceled);
		}
		if snapshot.is_none()
			&& let Err(error) = self.model.validate_existence(element)
		{
			debug!(element = ?element, %error, "Element does not exist");
			return Err(error);
		}

		trace!(element = ?element, "Building structure");
		let mut ctx = BuildContext::new(element.clone(), cancel, snapshot);
		self.elements.push_temporary_cache(ctx.temporary_cache());
		let built = self.model.build_structure(element, &mut ctx);
		self.elements.pop_temporary_cache()?;
		built?;
		ctx.check_canceled()?;
		Ok(ctx.into_bodies())
	}

	fn working_copy_snapshot(&self, element: &Handle) -> Option<Snapshot> {
		self.elements
			.peek_at_working_copy_info(element)
			.map(|info| info.buffer().snapshot())
	}

	/// Returns the body of `element`, building it if needed.
	pub fn body(&self, element: &Handle) -> Result<Arc<dyn ElementBody>> {
		self.open(element, &CancellationToken::new())
	}

	/// Returns the children of `element`.
	pub fn children(&self, element: &Handle) -> Result<Vec<Handle>> {
		Ok(self.body(element)?.children().to_vec())
	}

	/// Returns true if `element` exists.
	///
	/// Only a does-not-exist condition reads as `false`; any other failure to
	/// open the element is returned.
	pub fn exists(&self, element: &Handle) -> Result<bool> {
		if self.elements.is_cached(element) {
			return Ok(true);
		}
		match self.body(element) {
			Ok(_) => Ok(true),
			Err(error) if is_missing(&error) => {
				trace!(element = ?element, %error, "Element does not exist");
				Ok(false)
			}
			Err(error) => Err(error),
		}
	}

	/// Drops the body of the openable `element` and of its non-openable
	/// descendants. Non-openable elements are left alone.
	///
	/// Working copies cannot be closed.
	pub fn close(&self, element: &Handle) -> Result<()> {
		if !element.is_openable() {
			return Ok(());
		}
		if self.elements.peek_at_working_copy_info(element).is_some() {
			return Err(Error::illegal_state(format!("cannot close working copy {element:?}")));
		}
		let removed = self.elements.remove_subtree(element);
		self.elements.reset_max_size(self.config.cache_size, element);
		if !removed.is_empty() {
			debug!(element = ?element, bodies = removed.len(), "Closed element");
			self.model.on_close(element, CloseHint::Explicit);
		}
		Ok(())
	}

	/// Returns the smallest source element of `file` whose full range covers
	/// `offset`, or `None` if the file's own range does not cover it.
	///
	/// With a `base` snapshot, fails with [`Error::StaleSnapshot`] unless the
	/// structure was built from an equal snapshot.
	pub fn element_at(&self, file: &Handle, offset: usize, base: Option<&Snapshot>) -> Result<Option<Handle>> {
		let body = self.body(file)?;
		let Some(source) = body.as_source() else {
			return Ok(None);
		};
		if let Some(base) = base
			&& !source.snapshot().is_some_and(|s| s.is_equal_to(base))
		{
			debug!(file = ?file, "Stale snapshot in element lookup");
			return Err(Error::StaleSnapshot);
		}
		if !source.full_range().is_some_and(|r| r.covers(offset)) {
			return Ok(None);
		}

		let mut found = file.clone();
		let mut current = body;
		while let Some((child, child_body)) = self.child_covering(&*current, offset)? {
			found = child;
			current = child_body;
		}
		Ok(Some(found))
	}

	fn child_covering(&self, body: &dyn ElementBody, offset: usize) -> Result<Option<(Handle, Arc<dyn ElementBody>)>> {
		for child in body.children() {
			let child_body = self.body(child)?;
			if child_body
				.as_source()
				.and_then(|s| s.full_range())
				.is_some_and(|r| r.covers(offset))
			{
				return Ok(Some((child.clone(), child_body)));
			}
		}
		Ok(None)
	}

	/// Returns the source text of `element`'s full range.
	pub fn source_text(&self, element: &Handle) -> Result<Option<String>> {
		Ok(self.body(element)?.as_source().and_then(|s| s.source_text()))
	}

	pub(crate) fn fire(&self, kind: EventKinds, delta: crate::delta::ElementDelta) {
		self.notifications
			.fire_element_change_event(&ElementChangeEvent::new(kind, vec![delta]));
	}
}

fn is_missing(error: &Error) -> bool {
	match error {
		Error::Io { error, .. } => error.kind() == std::io::ErrorKind::NotFound,
		error => error.is_does_not_exist(),
	}
}

impl std::fmt::Debug for ModelManager {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ModelManager")
			.field("elements", &self.elements)
			.field("config", &self.config)
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests;
