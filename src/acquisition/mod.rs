//! Frame acquisition: the timed fetching loop and the region-cropping grabber
//! it drives.

pub mod fetch_loop;
pub mod grabber;

pub use fetch_loop::{AcquisitionLoop, LoopPhase, LoopStats, RunState};
pub use grabber::{FrameGrabber, RegionGrabber};
