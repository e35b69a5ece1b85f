//! Handle-based source models.
//!
//! A model is a tree of cheap, immutable [`Handle`]s. The state behind a
//! handle lives in an [`ElementBody`] that is built lazily ("opened") by the
//! hosting [`Model`] and kept in a bounded LRU [`ElementCache`] owned by the
//! [`ElementManager`]. Changes between two observed states of a handle tree
//! are described by hierarchical [`ElementDelta`]s, which the
//! [`ElementChangeRecorder`] computes by diffing body snapshots and the
//! [`NotificationManager`] fans out to listeners.
//!
//! [`ModelManager`] ties these together for one model instance: it opens and
//! closes elements, and runs the working-copy protocol (become, release,
//! reconcile) on top of [`handly_buffer::TextBuffer`]s.
//!
//! ## Threading
//!
//! Every type here is `Send + Sync`. The element manager serializes its
//! mutations behind one lock, guarantees at most one concurrent build per
//! openable element, and keeps temporary caches thread-confined. No operation
//! is asynchronous; notifications are dispatched synchronously on the firing
//! thread.

/// Element bodies and their properties.
pub mod body;
/// The bounded body cache.
pub mod cache;
/// Model configuration.
pub mod config;
/// Hierarchical change descriptions.
pub mod delta;
/// The process-local coordinator of bodies and working copies.
pub mod element_manager;
/// Free functions over handles.
pub mod elements;
/// Error types.
pub mod error;
/// Element handles.
pub mod handle;
/// The hosting-model contract.
pub mod model;
/// Open/close and working-copy operations for one model.
pub mod model_manager;
/// Change event fan-out.
pub mod notification;
/// Body-tree diffing.
pub mod recorder;
/// Working-copy bookkeeping.
pub mod working_copy;

pub use body::{
	Body, ElementBody, Properties, Property, PropertyType, PropertyValue, SourceElementBody,
	TextRange,
};
pub use cache::{ElementCache, TemporaryCache};
pub use config::ModelConfig;
pub use delta::{
	DeltaFlags, DeltaKind, ElementDelta, ElementDeltaBuilder, MarkerDelta, ResourceDelta,
	ResourceDeltaKind,
};
pub use element_manager::{ElementManager, EvictionListener};
pub use error::{Error, Result};
pub use handle::{ElementKind, Handle};
pub use model::{BuildContext, CloseHint, Model};
pub use model_manager::ModelManager;
pub use notification::{
	ElementChangeEvent, ElementChangeListener, ElementChangeListenerList, EventKinds,
	NotificationManager,
};
pub use recorder::{BodySource, ElementChangeRecorder};
pub use tokio_util::sync::CancellationToken;
pub use working_copy::{
	DefaultWorkingCopyCallback, ReconcileOutcome, WorkingCopyCallback, WorkingCopyInfo,
};
