//! # CCOL Core
//!
//! Concurrent containers for latency-sensitive producer/consumer pipelines:
//! - [`TrivialVector`]: double-buffered growable vector of plain-copy elements
//! - [`PagedVector`]: append-only vector with address-stable elements
//! - [`DoubleBufferQueue`]: producers fill a back buffer, consumers read the front
//!
//! ## Rules
//!
//! 1. **Readers never see a freed buffer**: replaced buffers are released
//!    only after their last reader leaves
//! 2. **Readers never see unwritten slots**: lengths are published after the
//!    element is stored
//! 3. **No blocking primitives**: every wait is a spin on `ccol_sync` locks
//!
//! ## Example
//!
//! ```rust
//! use ccol_core::{ContainerConfig, PagedQueue};
//!
//! let config = ContainerConfig::from_toml_str("page_size = 64").unwrap();
//! let log = PagedQueue::<String>::from_config(&config).unwrap();
//!
//! log.push_back("connected".to_string());
//! log.swap_buffers();
//!
//! for line in log.read().iter() {
//!     assert_eq!(line, "connected");
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod collections;
pub mod config;
pub mod error;
pub mod memory;
pub mod sync;

pub use collections::{PagedVector, Snapshot, SnapshotIter, TrivialVector};
pub use config::{ContainerConfig, DEFAULT_PAGE_SIZE};
pub use error::{CollectionError, CollectionResult};
pub use memory::TrivialElement;
pub use sync::{DoubleBufferQueue, FrontBuffer, PagedQueue, QueueStorage, TrivialQueue};
