//! # Producer/Consumer Hand-off
//!
//! ## The Problem
//!
//! ```text
//! Producers:  push events all frame long
//! Consumers:  read the events of the previous frame
//!
//! One shared container: every read contends with every push
//! ```
//!
//! ## The Solution: Double Buffering
//!
//! ```text
//! Frame N:
//!   producers append to buffer B
//!   consumers read buffer A
//!
//! End of frame N: swap
//!   producers append to buffer A (cleared)
//!   consumers read buffer B
//! ```

mod double_buffer;

pub use double_buffer::{
    DoubleBufferQueue,
    FrontBuffer,
    PagedQueue,
    QueueStorage,
    TrivialQueue,
};
