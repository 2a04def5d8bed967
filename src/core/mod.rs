//! # Core Infrastructure Module
//!
//! Frame types and the bounded frame buffer shared between the acquisition
//! loop and consumers.

pub mod frame;
pub mod frame_buffer;

pub use frame::{Frame, RawFrame};
pub use frame_buffer::{BufferStats, FrameBuffer, PushOutcome, RefreshPolicy};
