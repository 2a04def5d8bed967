//! # Enhancer Configuration
//!
//! Configuration passed to [`crate::Enhancer`] at construction. There is no
//! process-wide mutable state: values such as the engine resource path live
//! here and are fixed for the lifetime of the instance they were given to.
//!
//! ## Configuration Parameters
//!
//! | JSON key | Type | Range | Description |
//! |----------|------|-------|-------------|
//! | `loopInterval` | ms | ≥ 1 | Period of the acquisition tick |
//! | `maxNumberOfFramesInBuffer` | int | ≥ 1 | Frame buffer capacity |
//! | `refreshInterval` | ms | -1, 0, > 0 | Overflow policy (latch, ring, rate limit) |
//! | `videoFit` | string | contain/cover/fill/none | How the video fills its container |
//! | `canvasMaxSide` | px | ≥ 1 | Frames with a longer side are downscaled |
//! | `singleFrameMode` | bool | | Request a still image instead of live video |
//! | `autoAdvanceRegionIndex` | bool | | Cycle through `croppingRegions` per tick |
//! | `startFetchingOnPlay` | bool | | Start the acquisition loop when playback opens |
//! | `engineResourcePath` | string | | Opaque path handed to collaborators |
//! | `defaultUiElementUrl` | string | | Opaque UI template location |
//!
//! Unknown keys are rejected, missing keys take their defaults.
//!
//! ## Examples
//!
//! ```rust
//! use scan_capture::config::EnhancerConfig;
//!
//! let config = EnhancerConfig::from_json_str(r#"{ "loopInterval": 50, "refreshInterval": -1 }"#)?;
//! assert_eq!(config.loop_interval_ms, 50);
//! assert_eq!(config.max_number_of_frames_in_buffer, 10);
//! # Ok::<(), scan_capture::error::EnhancerError>(())
//! ```

use std::path::Path;
use std::time::Duration;

use scan_geometry::FitMode;
use serde::{Deserialize, Serialize};

use crate::core::frame_buffer::RefreshPolicy;
use crate::error::{EnhancerError, EnhancerResult};

/// Configuration for one enhancer instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct EnhancerConfig {
    /// Acquisition tick period in milliseconds. Must be at least 1 so the loop
    /// never spins.
    #[serde(rename = "loopInterval")]
    pub loop_interval_ms: u64,

    /// Frame buffer capacity, at least 1.
    pub max_number_of_frames_in_buffer: usize,

    /// Overflow policy selector in milliseconds.
    ///
    /// - `0`: ring buffer, the oldest frame is evicted when full
    /// - `-1`: latch, pushes are rejected while full until a consumer drains
    /// - `> 0`: accept at most one push per interval, then ring eviction
    #[serde(rename = "refreshInterval")]
    pub refresh_interval_ms: i64,

    /// Fit mode of the video inside its container.
    pub video_fit: FitMode,

    /// Longest side a buffered frame may have after cropping.
    pub canvas_max_side: u32,

    /// Ask the provider for a single still image instead of live video.
    pub single_frame_mode: bool,

    /// Advance `croppingRegionIndex` after every captured frame.
    pub auto_advance_region_index: bool,

    /// Start the acquisition loop as soon as playback opens.
    pub start_fetching_on_play: bool,

    pub engine_resource_path: Option<String>,

    pub default_ui_element_url: Option<String>,
}

impl Default for EnhancerConfig {
    /// Defaults:
    /// - `loopInterval`: 100 ms
    /// - `maxNumberOfFramesInBuffer`: 10
    /// - `refreshInterval`: 0 (ring buffer)
    /// - `videoFit`: contain
    /// - `canvasMaxSide`: 4096
    /// - `startFetchingOnPlay`: true, every other flag false
    fn default() -> Self {
        Self {
            loop_interval_ms: 100,
            max_number_of_frames_in_buffer: 10,
            refresh_interval_ms: 0,
            video_fit: FitMode::Contain,
            canvas_max_side: 4096,
            single_frame_mode: false,
            auto_advance_region_index: false,
            start_fetching_on_play: true,
            engine_resource_path: None,
            default_ui_element_url: None,
        }
    }
}

impl EnhancerConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> EnhancerResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            EnhancerError::config("<json>", json.trim(), e.to_string())
                .with_operation("parse_config")
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> EnhancerResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            EnhancerError::io("read_config", e).with_path(path.display().to_string())
        })?;
        Self::from_json_str(&text)
            .map_err(|e| e.with_context(format!("while loading {}", path.display())))
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> EnhancerResult<()> {
        if self.loop_interval_ms == 0 {
            return Err(EnhancerError::config(
                "loopInterval",
                "0",
                "must be at least 1ms",
            ));
        }
        if self.max_number_of_frames_in_buffer == 0 {
            return Err(EnhancerError::config(
                "maxNumberOfFramesInBuffer",
                "0",
                "buffer must hold at least one frame",
            ));
        }
        RefreshPolicy::from_interval_ms(self.refresh_interval_ms)?;
        if self.canvas_max_side == 0 {
            return Err(EnhancerError::config(
                "canvasMaxSide",
                "0",
                "must be greater than 0",
            ));
        }
        Ok(())
    }

    pub fn loop_interval(&self) -> Duration {
        Duration::from_millis(self.loop_interval_ms)
    }

    /// Overflow policy selected by `refreshInterval`.
    pub fn refresh_policy(&self) -> EnhancerResult<RefreshPolicy> {
        RefreshPolicy::from_interval_ms(self.refresh_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = EnhancerConfig::default();
        assert_eq!(config.loop_interval_ms, 100);
        assert_eq!(config.max_number_of_frames_in_buffer, 10);
        assert_eq!(config.refresh_interval_ms, 0);
        assert_eq!(config.video_fit, FitMode::Contain);
        assert!(config.start_fetching_on_play);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = EnhancerConfig::default();

        config.loop_interval_ms = 0;
        assert!(config.validate().is_err());
        config.loop_interval_ms = 1;
        assert!(config.validate().is_ok());

        config.max_number_of_frames_in_buffer = 0;
        assert!(config.validate().is_err());
        config.max_number_of_frames_in_buffer = 1;

        config.refresh_interval_ms = -2;
        assert!(config.validate().is_err());
        config.refresh_interval_ms = -1;
        assert_eq!(config.refresh_policy().unwrap(), RefreshPolicy::Latch);

        config.canvas_max_side = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_keys_are_camel_case() {
        let config = EnhancerConfig::from_json_str(
            r#"{
                "loopInterval": 33,
                "maxNumberOfFramesInBuffer": 3,
                "refreshInterval": 250,
                "videoFit": "cover",
                "autoAdvanceRegionIndex": true,
                "engineResourcePath": "/opt/engine"
            }"#,
        )
        .unwrap();
        assert_eq!(config.loop_interval(), Duration::from_millis(33));
        assert_eq!(config.max_number_of_frames_in_buffer, 3);
        assert_eq!(
            config.refresh_policy().unwrap(),
            RefreshPolicy::RateLimited(Duration::from_millis(250))
        );
        assert_eq!(config.video_fit, FitMode::Cover);
        assert!(config.auto_advance_region_index);
        assert_eq!(config.engine_resource_path.as_deref(), Some("/opt/engine"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = EnhancerConfig::from_json_str(r#"{ "loopIntervall": 10 }"#).unwrap_err();
        assert_eq!(err.category(), "config");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{ "maxNumberOfFramesInBuffer": 2, "refreshInterval": -1 }}"#).unwrap();
        let config = EnhancerConfig::load(file.path()).unwrap();
        assert_eq!(config.max_number_of_frames_in_buffer, 2);
        assert_eq!(config.refresh_policy().unwrap(), RefreshPolicy::Latch);

        let missing = EnhancerConfig::load("/definitely/not/here.json").unwrap_err();
        assert_eq!(missing.category(), "io");
    }
}
