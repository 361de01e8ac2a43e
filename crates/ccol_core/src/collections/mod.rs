//! # Collections
//!
//! Concurrent vectors.
//!
//! | Type              | Elements          | Reads return | Addresses stable |
//! |-------------------|-------------------|--------------|------------------|
//! | [`TrivialVector`] | `Copy + Zeroable` | copies       | no (buffers move)|
//! | [`PagedVector`]   | any `T`           | `&T`         | yes              |

mod paged_vector;
mod trivial_vector;

pub use paged_vector::{Iter, PagedVector};
pub use trivial_vector::{Snapshot, SnapshotIter, TrivialVector};
