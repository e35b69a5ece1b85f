//! Model configuration.
//!
//! ```toml
//! cache_size = 5000
//! load_factor = 0.5
//! reconcile_depth = 1
//! child_headroom = true
//! ```
//!
//! Every key is optional.

use serde::Deserialize;

use crate::error::{Error, Result};

/// Tunables of a [`crate::ModelManager`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
	/// Body-cache capacity.
	pub cache_size: usize,
	/// Fraction of the capacity that survives an overflow, in `(0, 1]`.
	pub load_factor: f64,
	/// Change-recorder depth used by reconcile.
	pub reconcile_depth: usize,
	/// Raise the cache capacity while a freshly built subtree is committed.
	pub child_headroom: bool,
}

impl Default for ModelConfig {
	fn default() -> Self {
		Self {
			cache_size: 5000,
			load_factor: 0.5,
			reconcile_depth: 1,
			child_headroom: true,
		}
	}
}

impl ModelConfig {
	/// Parses and validates a TOML document.
	pub fn from_toml_str(text: &str) -> Result<Self> {
		let config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
		config.validate()?;
		Ok(config)
	}

	/// Checks value ranges.
	pub fn validate(&self) -> Result<()> {
		if self.cache_size == 0 {
			return Err(Error::Config("cache_size must be positive".into()));
		}
		let in_range = self.load_factor > 0.0 && self.load_factor <= 1.0;
		if !in_range {
			return Err(Error::Config(format!(
				"load_factor must be in (0, 1], got {}",
				self.load_factor
			)));
		}
		Ok(())
	}
}
