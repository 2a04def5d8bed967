//! # Playback Control
//!
//! Owns the capture source's lifecycle and drives the acquisition loop.
//!
//! ```text
//!            open()               source ready            close()
//!   Closed ─────────▶ Opening ─────────────────▶ Open ───────────▶ Closed
//!                                                ├─ Playing ◀─┐
//!                                                └─ Paused  ──┘ pause()/resume()
//! ```
//!
//! ## Play rounds
//!
//! Every `open()` and `close()` increments the play round. An `open()` keeps
//! the round it started with and re-checks it after each suspension point
//! (provider open, readiness wait, slot lock). If a newer call has bumped the
//! round in the meantime, the request is stale: the source it obtained is
//! shut down and the call resolves with [`PlayOutcome::Superseded`] instead of
//! an error, because the caller already asked for something newer.
//!
//! ## Visibility
//!
//! Visibility arrives one way, through
//! [`PlaybackController::on_visibility_change`]. Hiding pauses a playing
//! source; showing resumes it only if it was the hide that paused it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::acquisition::AcquisitionLoop;
use crate::capture::{CaptureSource, SourceKind, SourceProvider, SourceRequest, SourceSlot, VideoDeviceInfo};
use crate::error::{EnhancerError, EnhancerResult, Retryable};
use crate::events::{EnhancerEvent, EventHub};
use crate::lock;

const READY_POLL: Duration = Duration::from_millis(5);
const READY_TIMEOUT: Duration = Duration::from_secs(10);

/// What was opened, delivered with `Played`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayInfo {
    pub width: u32,
    pub height: u32,
    pub device_id: Option<String>,
    pub single_frame: bool,
}

impl PlayInfo {
    fn of(source: &dyn CaptureSource) -> Self {
        let (width, height) = source.intrinsic_size();
        Self {
            width,
            height,
            device_id: source.device_id().map(str::to_owned),
            single_frame: source.kind() == SourceKind::SingleFrame,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenState {
    Playing,
    Paused,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    Closed,
    Opening { round: u64 },
    Open(OpenState),
}

impl PlaybackState {
    fn name(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Opening { .. } => "opening",
            Self::Open(OpenState::Playing) => "playing",
            Self::Open(OpenState::Paused) => "paused",
        }
    }
}

/// Resolution of an `open()` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlayOutcome {
    Opened(PlayInfo),
    /// A newer `open()` or `close()` took over; nothing was changed.
    Superseded { round: u64 },
}

impl PlayOutcome {
    pub fn info(&self) -> Option<&PlayInfo> {
        match self {
            Self::Opened(info) => Some(info),
            Self::Superseded { .. } => None,
        }
    }
}

#[derive(Debug)]
struct PlaybackInner {
    state: PlaybackState,
    round: u64,
    info: Option<PlayInfo>,
    /// A `Played` went out with no `Closed` after it yet.
    announced: bool,
    hidden: bool,
    resume_on_visible: bool,
}

pub struct PlaybackController {
    provider: Arc<dyn SourceProvider>,
    slot: Arc<SourceSlot>,
    acquisition: Arc<AcquisitionLoop>,
    events: EventHub,
    inner: Mutex<PlaybackInner>,
    start_fetching_on_play: AtomicBool,
}

impl PlaybackController {
    pub fn new(
        provider: Arc<dyn SourceProvider>,
        slot: Arc<SourceSlot>,
        acquisition: Arc<AcquisitionLoop>,
        events: EventHub,
        start_fetching_on_play: bool,
    ) -> Self {
        Self {
            provider,
            slot,
            acquisition,
            events,
            inner: Mutex::new(PlaybackInner {
                state: PlaybackState::Closed,
                round: 0,
                info: None,
                announced: false,
                hidden: false,
                resume_on_visible: false,
            }),
            start_fetching_on_play: AtomicBool::new(start_fetching_on_play),
        }
    }

    pub fn state(&self) -> PlaybackState {
        lock(&self.inner).state
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state(), PlaybackState::Open(_))
    }

    /// Current play round.
    pub fn round(&self) -> u64 {
        lock(&self.inner).round
    }

    pub fn play_info(&self) -> Option<PlayInfo> {
        lock(&self.inner).info.clone()
    }

    pub fn resolution(&self) -> Option<(u32, u32)> {
        lock(&self.inner).info.as_ref().map(|i| (i.width, i.height))
    }

    pub fn set_start_fetching_on_play(&self, on: bool) {
        self.start_fetching_on_play.store(on, Ordering::Relaxed);
    }

    /// Open a source and start playing it. The currently open source, if any,
    /// is released first; opening always renegotiates with the provider.
    pub async fn open(&self, request: &SourceRequest) -> EnhancerResult<PlayOutcome> {
        let round = {
            let mut inner = lock(&self.inner);
            inner.round += 1;
            inner.state = PlaybackState::Opening { round: inner.round };
            inner.info = None;
            inner.round
        };
        debug!(round, device = ?request.device_id, single_frame = request.single_frame, "opening capture source");

        self.acquisition.hold(true);
        if let Err(e) = self.slot.release().await {
            warn!(round, error = %e, "failed to release previous source");
        }

        match self.open_round(round, request).await {
            Ok(info) => Ok(PlayOutcome::Opened(info)),
            Err(e) if e.is_stale() => {
                debug!(round, reason = %e, "open superseded");
                Ok(PlayOutcome::Superseded { round })
            }
            Err(e) => {
                let announced = {
                    let mut inner = lock(&self.inner);
                    if inner.round != round {
                        None
                    } else {
                        inner.state = PlaybackState::Closed;
                        Some(std::mem::take(&mut inner.announced))
                    }
                };
                let Some(announced) = announced else {
                    debug!(round, error = %e, "open failed after being superseded");
                    return Ok(PlayOutcome::Superseded { round });
                };
                if self.acquisition.stop() {
                    self.events.emit(EnhancerEvent::FetchingLoopStopped);
                }
                self.acquisition.hold(false);
                if announced {
                    self.events.emit(EnhancerEvent::Closed);
                }
                warn!(
                    round,
                    error = %e,
                    retryable = e.is_retryable(),
                    retry_after_ms = ?e.retry_delay_ms(),
                    "open failed"
                );
                Err(e.with_operation("open"))
            }
        }
    }

    async fn open_round(&self, round: u64, request: &SourceRequest) -> EnhancerResult<PlayInfo> {
        let mut source = self.provider.open(request).await?;
        if let Err(e) = self.wait_until_ready(source.as_ref(), round).await {
            shutdown_quietly(source.as_mut()).await;
            return Err(e);
        }
        let info = PlayInfo::of(source.as_ref());
        let kind = source.kind();

        let paused = {
            let mut slot = self.slot.lock().await;
            if let Err(stale) = self.check_round(round, "open") {
                drop(slot);
                shutdown_quietly(source.as_mut()).await;
                return Err(stale);
            }
            let paused = {
                let mut inner = lock(&self.inner);
                let paused = inner.hidden;
                inner.state = PlaybackState::Open(if paused {
                    OpenState::Paused
                } else {
                    OpenState::Playing
                });
                inner.resume_on_visible = paused;
                inner.info = Some(info.clone());
                inner.announced = true;
                paused
            };
            source.set_paused(paused);
            if let Some(mut previous) = slot.replace(source) {
                shutdown_quietly(previous.as_mut()).await;
            }
            paused
        };

        self.acquisition.hold(paused);
        if self.start_fetching_on_play.load(Ordering::Relaxed) && self.acquisition.start() {
            self.events.emit(EnhancerEvent::FetchingLoopStarted);
        }
        info!(
            round,
            width = info.width,
            height = info.height,
            device = ?info.device_id,
            "capture source open"
        );
        self.events.emit(EnhancerEvent::Played(info.clone()));

        if kind == SourceKind::SingleFrame {
            match self.acquisition.grab_once().await {
                Ok(frame) => self.events.emit(EnhancerEvent::SingleFrameAcquired(frame)),
                Err(e) => warn!(error = %e, "single frame capture failed"),
            }
        }
        Ok(info)
    }

    async fn wait_until_ready(&self, source: &dyn CaptureSource, round: u64) -> EnhancerResult<()> {
        let deadline = Instant::now() + READY_TIMEOUT;
        while !source.is_ready() {
            self.check_round(round, "open")?;
            if Instant::now() >= deadline {
                return Err(EnhancerError::source(
                    source.device_id().map(str::to_owned),
                    "source did not become ready",
                )
                .retryable());
            }
            tokio::time::sleep(READY_POLL).await;
        }
        self.check_round(round, "open")
    }

    fn check_round(&self, round: u64, operation: &str) -> EnhancerResult<()> {
        let current = lock(&self.inner).round;
        if current != round {
            return Err(EnhancerError::stale(operation, round, current));
        }
        Ok(())
    }

    /// Release the source, stop the loop and go to `Closed`. Closing while
    /// closed is a no-op; closing while opening makes that open stale.
    pub async fn close(&self) -> EnhancerResult<()> {
        let was_open = {
            let mut inner = lock(&self.inner);
            inner.round += 1;
            let was_open = inner.state != PlaybackState::Closed || inner.announced;
            inner.state = PlaybackState::Closed;
            inner.info = None;
            inner.announced = false;
            inner.resume_on_visible = false;
            was_open
        };
        if self.acquisition.stop() {
            self.events.emit(EnhancerEvent::FetchingLoopStopped);
        }
        self.acquisition.hold(false);
        self.slot.release().await?;
        if was_open {
            info!("capture source closed");
            self.events.emit(EnhancerEvent::Closed);
        }
        Ok(())
    }

    /// `Playing → Paused`. The device stays open and the loop stays armed.
    pub async fn pause(&self) -> EnhancerResult<()> {
        lock(&self.inner).resume_on_visible = false;
        self.set_paused(true, "pause").await.map(|_| ())
    }

    /// `Paused → Playing`.
    pub async fn resume(&self) -> EnhancerResult<()> {
        lock(&self.inner).resume_on_visible = false;
        self.set_paused(false, "resume").await.map(|_| ())
    }

    /// Returns whether the state changed.
    async fn set_paused(&self, paused: bool, operation: &str) -> EnhancerResult<bool> {
        {
            let mut inner = lock(&self.inner);
            let target = if paused {
                OpenState::Paused
            } else {
                OpenState::Playing
            };
            match inner.state {
                PlaybackState::Open(current) if current == target => return Ok(false),
                PlaybackState::Open(_) => inner.state = PlaybackState::Open(target),
                other => {
                    return Err(EnhancerError::state(
                        other.name(),
                        operation,
                        "no capture source is open",
                    ));
                }
            }
        }
        self.acquisition.hold(paused);
        if let Some(source) = self.slot.lock().await.as_mut() {
            source.set_paused(paused);
        }
        debug!(paused, "playback {}", operation);
        self.events.emit(if paused {
            EnhancerEvent::Paused
        } else {
            EnhancerEvent::Resumed
        });
        Ok(true)
    }

    /// Document visibility changed.
    pub async fn on_visibility_change(&self, visible: bool) -> EnhancerResult<()> {
        self.acquisition.set_visible(visible);
        let (state, resume) = {
            let mut inner = lock(&self.inner);
            inner.hidden = !visible;
            let resume = visible && std::mem::take(&mut inner.resume_on_visible);
            (inner.state, resume)
        };
        self.events.emit(EnhancerEvent::VisibilityChanged { visible });

        if !visible && state == PlaybackState::Open(OpenState::Playing) {
            if self.set_paused(true, "pause").await? {
                lock(&self.inner).resume_on_visible = true;
            }
        } else if resume && state == PlaybackState::Open(OpenState::Paused) {
            self.set_paused(false, "resume").await?;
        }
        Ok(())
    }

    pub async fn devices(&self) -> EnhancerResult<Vec<VideoDeviceInfo>> {
        self.provider.devices().await
    }

    /// Opaque capabilities of the open source.
    pub async fn capabilities(&self) -> EnhancerResult<serde_json::Value> {
        match self.slot.lock().await.as_ref() {
            Some(source) => Ok(source.capabilities()),
            None => Err(EnhancerError::state(
                self.state().name(),
                "get_capabilities",
                "no capture source is open",
            )),
        }
    }

    pub async fn apply_constraints(&self, constraints: &serde_json::Value) -> EnhancerResult<()> {
        match self.slot.lock().await.as_mut() {
            Some(source) => source.apply_constraints(constraints).await,
            None => Err(EnhancerError::state(
                self.state().name(),
                "apply_constraints",
                "no capture source is open",
            )),
        }
    }
}

async fn shutdown_quietly(source: &mut dyn CaptureSource) {
    if let Err(e) = source.shutdown().await {
        warn!(error = %e, "source shutdown failed");
    }
}
