//! Common test utilities and helpers for the scan_capture tests
//!
//! Everything here runs on tokio's paused clock: tests are declared with
//! `#[tokio::test(start_paused = true)]` so loop ticks and open delays cost no
//! wall time.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use scan_capture::capture::SourceStats;
use scan_capture::{Enhancer, EnhancerConfig, EnhancerEvent, EventKind, PatternProvider};

/// Synthetic camera resolution used by the tests; small enough that every
/// crop and resize is instant.
pub const VIDEO_W: u32 = 160;
pub const VIDEO_H: u32 = 120;

/// Config with the given loop period, capacity and refresh interval.
pub fn config(interval_ms: u64, capacity: usize, refresh_ms: i64) -> EnhancerConfig {
    EnhancerConfig {
        loop_interval_ms: interval_ms,
        max_number_of_frames_in_buffer: capacity,
        refresh_interval_ms: refresh_ms,
        ..EnhancerConfig::default()
    }
}

/// Enhancer over a fresh pattern provider, plus the provider's source stats.
pub fn pattern_enhancer(config: EnhancerConfig) -> (Arc<Enhancer>, Arc<SourceStats>) {
    with_provider(config, PatternProvider::new(VIDEO_W, VIDEO_H))
}

pub fn with_provider(
    config: EnhancerConfig,
    provider: PatternProvider,
) -> (Arc<Enhancer>, Arc<SourceStats>) {
    let stats = provider.stats();
    let enhancer = Enhancer::new(config, Arc::new(provider)).expect("valid test config");
    (Arc::new(enhancer), stats)
}

/// Poll `cond` every millisecond of (paused) time until it holds or `limit`
/// elapses. Returns whether it held.
pub async fn wait_for(limit: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    cond()
}

/// Records the kinds of every event an enhancer emits.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<EnhancerEvent>>>,
}

impl EventLog {
    pub fn attach(enhancer: &Enhancer) -> Self {
        let log = Self::default();
        for kind in [
            EventKind::Played,
            EventKind::Paused,
            EventKind::Resumed,
            EventKind::Closed,
            EventKind::SingleFrameAcquired,
            EventKind::ScanRegionChanged,
            EventKind::FetchingLoopStarted,
            EventKind::FetchingLoopStopped,
            EventKind::VisibilityChanged,
        ] {
            let events = log.events.clone();
            enhancer.on(kind, move |event| {
                events.lock().unwrap().push(event.clone());
            });
        }
        log
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().unwrap().iter().map(|e| e.kind()).collect()
    }

    pub fn events(&self) -> Vec<EnhancerEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.kinds().into_iter().filter(|k| *k == kind).count()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}
