//! # Memory
//!
//! Element storage behind the containers.
//!
//! - [`Buffer`] / [`BufferSlot`]: contiguous, zero-filled, replaced whole on
//!   growth and freed once every reader has left
//! - [`Page`] / [`PageRef`]: fixed blocks that never move, so references
//!   into them stay valid while more elements are appended

mod buffer;
mod page;

pub use buffer::TrivialElement;
pub(crate) use buffer::{Buffer, BufferSlot};
pub(crate) use page::{Page, PageRef};
