//! Error types for model operations.

use std::path::PathBuf;

use handly_buffer::BufferError;
use thiserror::Error;

use crate::handle::Handle;

/// Errors that can occur while operating on a model.
#[derive(Debug, Error)]
pub enum Error {
	/// The element's underlying resource is missing or invalid.
	#[error("element {0:?} does not exist")]
	DoesNotExist(Handle),

	/// A caller passed an argument violating an operation's contract.
	#[error("illegal argument: {0}")]
	IllegalArgument(String),

	/// An operation was invoked in a state that does not permit it.
	#[error("illegal state: {0}")]
	IllegalState(String),

	/// The cached structure was built from a different snapshot than the
	/// caller's baseline.
	#[error("snapshot is stale")]
	StaleSnapshot,

	/// A cancellation token was tripped during the operation.
	#[error("operation canceled")]
	Canceled,

	/// A working-copy callback failed.
	#[error("working copy callback failed: {0}")]
	Callback(String),

	/// A buffer operation failed.
	#[error(transparent)]
	Buffer(#[from] BufferError),

	/// Reading an underlying resource failed.
	#[error("I/O error on {path}: {error}")]
	Io {
		/// Path of the resource.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// Configuration could not be parsed or is out of range.
	#[error("invalid configuration: {0}")]
	Config(String),
}

impl Error {
	/// Returns true for [`Error::DoesNotExist`].
	pub fn is_does_not_exist(&self) -> bool {
		matches!(self, Self::DoesNotExist(_))
	}

	/// Returns true for [`Error::Canceled`].
	pub fn is_canceled(&self) -> bool {
		matches!(self, Self::Canceled)
	}

	pub(crate) fn illegal_argument(message: impl Into<String>) -> Self {
		Self::IllegalArgument(message.into())
	}

	pub(crate) fn illegal_state(message: impl Into<String>) -> Self {
		Self::IllegalState(message.into())
	}
}

/// Result type for model operations.
pub type Result<T> = std::result::Result<T, Error>;
