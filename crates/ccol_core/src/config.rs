//! # Container Configuration
//!
//! Sizing knobs for the containers, loadable from TOML once at startup.
//!
//! ```toml
//! initial_capacity = 4096
//! page_size = 256
//! ```
//!
//! Missing keys fall back to [`ContainerConfig::default`].

use serde::Deserialize;

use crate::error::{CollectionError, CollectionResult};

/// Default number of elements per page of a [`PagedVector`](crate::PagedVector).
pub const DEFAULT_PAGE_SIZE: usize = 1024;

/// Sizing configuration shared by every container.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContainerConfig {
    /// Elements reserved up front by a [`TrivialVector`](crate::TrivialVector).
    ///
    /// Zero means the first push allocates.
    pub initial_capacity: usize,
    /// Elements per page of a [`PagedVector`](crate::PagedVector).
    pub page_size: usize,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 0,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ContainerConfig {
    /// Low-latency preset: enough headroom that a frame's worth of events
    /// never triggers a grow on the hot path.
    ///
    /// 16K trivial elements up front, 4K elements per page.
    #[must_use]
    pub const fn low_latency() -> Self {
        Self {
            initial_capacity: 16_384,
            page_size: 4096,
        }
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::InvalidConfig`] if the document does not
    /// parse or fails [`validate`](Self::validate).
    pub fn from_toml_str(source: &str) -> CollectionResult<Self> {
        let config: Self = toml::from_str(source)
            .map_err(|e| CollectionError::InvalidConfig(format!("failed to parse TOML: {e}")))?;
        config.validate()?;
        tracing::debug!(
            initial_capacity = config.initial_capacity,
            page_size = config.page_size,
            "loaded container config"
        );
        Ok(config)
    }

    /// Checks that every value can actually be used.
    ///
    /// # Errors
    ///
    /// - `page_size` is zero
    /// - `initial_capacity` exceeds the largest power of two a `usize` holds
    pub fn validate(&self) -> CollectionResult<()> {
        if self.page_size == 0 {
            return Err(CollectionError::InvalidConfig(
                "page_size must be greater than zero".to_string(),
            ));
        }
        if self.initial_capacity.checked_next_power_of_two().is_none() {
            return Err(CollectionError::InvalidConfig(format!(
                "initial_capacity {} cannot be reached by doubling",
                self.initial_capacity
            )));
        }
        Ok(())
    }
}
