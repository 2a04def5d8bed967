//! Scan-region state: the active region, overlays, and container layout.

pub mod layout;
pub mod overlay;
pub mod store;

pub use layout::Layout;
pub use overlay::{DrawnMask, MaskStyle, OverlayHandle, OverlayRole};
pub use store::{RegionSnapshot, RegionStore};
