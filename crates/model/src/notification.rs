//! Change event fan-out.
//!
//! Listeners register with an [`EventKinds`] mask and receive every fired
//! event whose kind intersects it. Dispatch is synchronous on the firing
//! thread, in registration order, and runs outside any lock so listeners may
//! register or fire events themselves.

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use parking_lot::RwLock;
use tracing::trace;

use crate::delta::ElementDelta;

bitflags! {
	/// Kinds of change events.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
	pub struct EventKinds: u32 {
		/// Fired after a change was applied to the model.
		const POST_CHANGE = 1 << 0;
		/// Fired after a working copy was reconciled.
		const POST_RECONCILE = 1 << 1;
	}
}

/// An event carrying one or more delta trees.
///
/// Deltas are only valid for the duration of the callback.
#[derive(Debug)]
pub struct ElementChangeEvent {
	kind: EventKinds,
	deltas: Vec<ElementDelta>,
}

impl ElementChangeEvent {
	/// Creates an event of a single kind.
	pub fn new(kind: EventKinds, deltas: Vec<ElementDelta>) -> Self {
		Self { kind, deltas }
	}

	/// Returns the event kind.
	pub fn kind(&self) -> EventKinds {
		self.kind
	}

	/// Returns the deltas.
	pub fn deltas(&self) -> &[ElementDelta] {
		&self.deltas
	}

	/// Returns the first delta.
	pub fn delta(&self) -> Option<&ElementDelta> {
		self.deltas.first()
	}
}

/// Receives change events.
pub trait ElementChangeListener: Send + Sync {
	/// Handles one event. Must not block indefinitely.
	fn element_changed(&self, event: &ElementChangeEvent);
}

impl<F> ElementChangeListener for F
where
	F: Fn(&ElementChangeEvent) + Send + Sync,
{
	fn element_changed(&self, event: &ElementChangeEvent) {
		self(event)
	}
}

type Entry = (Arc<dyn ElementChangeListener>, EventKinds);

/// Copy-on-write list of listeners and their masks.
#[derive(Default)]
pub struct ElementChangeListenerList {
	entries: RwLock<Arc<Vec<Entry>>>,
}

impl ElementChangeListenerList {
	/// Creates an empty list.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `listener` for `kinds`.
	///
	/// Re-adding a listener replaces its mask in place; an empty mask parks
	/// it without removing the registration.
	pub fn add(&self, listener: Arc<dyn ElementChangeListener>, kinds: EventKinds) {
		let mut entries = self.entries.write();
		let mut next = Vec::clone(&entries);
		match next.iter_mut().find(|(l, _)| same_listener(l, &listener)) {
			Some(entry) => entry.1 = kinds,
			None => next.push((listener, kinds)),
		}
		*entries = Arc::new(next);
	}

	/// Unregisters `listener`.
	pub fn remove(&self, listener: &Arc<dyn ElementChangeListener>) {
		let mut entries = self.entries.write();
		if entries.iter().any(|(l, _)| same_listener(l, listener)) {
			let next: Vec<Entry> = entries.iter().filter(|(l, _)| !same_listener(l, listener)).cloned().collect();
			*entries = Arc::new(next);
		}
	}

	/// Returns the number of registrations, parked ones included.
	pub fn len(&self) -> usize {
		self.entries.read().len()
	}

	/// Returns true if nothing is registered.
	pub fn is_empty(&self) -> bool {
		self.entries.read().is_empty()
	}

	/// Delivers `event` to every listener whose mask intersects its kind.
	pub fn fire(&self, event: &ElementChangeEvent) {
		let entries = Arc::clone(&self.entries.read());
		for (listener, kinds) in entries.iter() {
			if kinds.intersects(event.kind) {
				listener.element_changed(event);
			}
		}
	}
}

impl fmt::Debug for ElementChangeListenerList {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ElementChangeListenerList").field("len", &self.len()).finish()
	}
}

fn same_listener(a: &Arc<dyn ElementChangeListener>, b: &Arc<dyn ElementChangeListener>) -> bool {
	std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Fires change events for one model.
#[derive(Debug, Default)]
pub struct NotificationManager {
	listeners: ElementChangeListenerList,
}

impl NotificationManager {
	/// Creates a manager without listeners.
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `listener` for `kinds`.
	pub fn add_listener(&self, listener: Arc<dyn ElementChangeListener>, kinds: EventKinds) {
		self.listeners.add(listener, kinds);
	}

	/// Unregisters `listener`.
	pub fn remove_listener(&self, listener: &Arc<dyn ElementChangeListener>) {
		self.listeners.remove(listener);
	}

	/// Returns the listener list.
	pub fn listeners(&self) -> &ElementChangeListenerList {
		&self.listeners
	}

	/// Dispatches `event` synchronously.
	pub fn fire_element_change_event(&self, event: &ElementChangeEvent) {
		trace!(kind = ?event.kind(), deltas = event.deltas().len(), "Firing element change event");
		self.listeners.fire(event);
	}
}
