//! Text services consumed by the handle model.
//!
//! A [`TextBuffer`] is the in-memory source of truth for a working copy. It
//! carries a reference count shared with the working-copy registry, accepts
//! [`BufferChange`]s, and hands out cheap immutable [`Snapshot`]s that the
//! model records in source element bodies.

/// Reference-counted editable text buffer.
pub mod buffer;
/// Edits applied to a buffer.
pub mod change;
/// Buffer error types.
pub mod error;
/// Immutable text snapshots.
pub mod snapshot;

pub use buffer::{BufferId, TextBuffer};
pub use change::{BufferChange, Edit};
pub use error::{BufferError, Result};
pub use ropey::{Rope, RopeSlice};
pub use snapshot::Snapshot;
