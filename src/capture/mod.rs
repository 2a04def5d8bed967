// # Capture Module
//
// Capture source interfaces and the built-in synthetic and still-image
// sources.

pub mod source;
pub mod sources;

pub use source::{
    CaptureSource, SourceKind, SourceProvider, SourceRequest, SourceSlot, VideoDeviceInfo,
};
pub use sources::{
    PatternProvider, PatternSource, SourceStats, StillImageProvider, StillImageSource,
};
