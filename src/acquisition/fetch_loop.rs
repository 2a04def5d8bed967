//! # Acquisition Loop
//!
//! Timed polling task that grabs a frame every `loopInterval` and pushes it
//! into the [`FrameBuffer`].
//!
//! ```text
//!              start()                      stop()
//!   Stopped ───────────▶ Running ─────────────────▶ Stopped
//!                        ├─ Active
//!                        └─ PausedByVisibility
//! ```
//!
//! Ticks run on a `tokio::time::interval` with
//! [`MissedTickBehavior::Delay`]: the task awaits each grab before asking for
//! the next tick, so ticks never overlap and a late tick pushes the schedule
//! back instead of bursting.
//!
//! Every `start()` opens a new epoch. A tick only pushes while holding the
//! state lock and only if its epoch is still current, and `stop()` bumps the
//! epoch under that same lock, so once `stop()` returns no frame from the old
//! run can land in the buffer. This holds even when `stop()` is called from
//! inside a tick.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, trace, warn};

use crate::acquisition::grabber::FrameGrabber;
use crate::core::frame::Frame;
use crate::core::frame_buffer::{BufferStats, FrameBuffer, PushOutcome, RefreshPolicy};
use crate::error::{EnhancerError, EnhancerResult, classify};
use crate::lock;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Active,
    PausedByVisibility,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopPhase {
    Stopped,
    Running(RunState),
}

/// Counters for the current and past runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Ticks that attempted a capture.
    pub ticks: u64,
    /// Ticks that produced no frame.
    pub skipped: u64,
    /// Ticks suppressed by visibility or playback pause.
    pub suppressed: u64,
    pub buffer: BufferStats,
}

#[derive(Debug)]
struct LoopState {
    buffer: FrameBuffer,
    phase: LoopPhase,
    epoch: u64,
    /// Document hidden; carried across runs.
    hidden: bool,
    /// Playback paused; ticks are suppressed while the loop stays armed.
    held: bool,
    sequence: u64,
    ticks: u64,
    skipped: u64,
    suppressed: u64,
}

impl LoopState {
    fn run_state(&self) -> RunState {
        if self.hidden {
            RunState::PausedByVisibility
        } else {
            RunState::Active
        }
    }
}

pub struct AcquisitionLoop {
    grabber: Arc<dyn FrameGrabber>,
    state: Arc<Mutex<LoopState>>,
    interval_ms: Arc<AtomicU64>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl AcquisitionLoop {
    pub fn new(
        grabber: Arc<dyn FrameGrabber>,
        interval: Duration,
        capacity: usize,
        policy: RefreshPolicy,
    ) -> EnhancerResult<Self> {
        let interval_ms = check_interval(interval)?;
        Ok(Self {
            grabber,
            state: Arc::new(Mutex::new(LoopState {
                buffer: FrameBuffer::new(capacity, policy)?,
                phase: LoopPhase::Stopped,
                epoch: 0,
                hidden: false,
                held: false,
                sequence: 0,
                ticks: 0,
                skipped: 0,
                suppressed: 0,
            })),
            interval_ms: Arc::new(AtomicU64::new(interval_ms)),
            task: Mutex::new(None),
        })
    }

    /// `Stopped → Running`. Returns `false` if already running. Must be called
    /// from within a tokio runtime.
    pub fn start(&self) -> bool {
        let epoch = {
            let mut state = lock(&self.state);
            if state.phase != LoopPhase::Stopped {
                return false;
            }
            state.epoch += 1;
            state.phase = LoopPhase::Running(state.run_state());
            state.buffer.clear();
            state.epoch
        };

        let handle = tokio::spawn(run(
            self.grabber.clone(),
            self.state.clone(),
            self.interval_ms.clone(),
            epoch,
        ));
        if let Some(stale) = lock(&self.task).replace(handle) {
            stale.abort();
        }
        info!(
            epoch,
            interval_ms = self.interval_ms.load(Ordering::Relaxed),
            "fetching loop started"
        );
        true
    }

    /// `Running → Stopped`, cancelling the pending tick and clearing the
    /// buffer. Returns `false` if it was already stopped; the buffer is
    /// cleared either way.
    pub fn stop(&self) -> bool {
        let was_running = {
            let mut state = lock(&self.state);
            state.buffer.clear();
            if state.phase == LoopPhase::Stopped {
                false
            } else {
                state.epoch += 1;
                state.phase = LoopPhase::Stopped;
                true
            }
        };
        if let Some(task) = lock(&self.task).take() {
            task.abort();
        }
        if was_running {
            info!("fetching loop stopped");
        }
        was_running
    }

    /// Running, whatever the sub-state.
    pub fn is_started(&self) -> bool {
        lock(&self.state).phase != LoopPhase::Stopped
    }

    pub fn phase(&self) -> LoopPhase {
        lock(&self.state).phase
    }

    /// Visibility pass-through from the layout observer.
    pub fn set_visible(&self, visible: bool) {
        let mut state = lock(&self.state);
        state.hidden = !visible;
        if let LoopPhase::Running(_) = state.phase {
            state.phase = LoopPhase::Running(state.run_state());
        }
    }

    /// Suppress (or re-enable) ticks without stopping the loop.
    pub fn hold(&self, held: bool) {
        lock(&self.state).held = held;
    }

    pub fn is_held(&self) -> bool {
        lock(&self.state).held
    }

    /// New tick period, applied after the next tick.
    pub fn set_interval(&self, interval: Duration) -> EnhancerResult<()> {
        let ms = check_interval(interval)?;
        self.interval_ms.store(ms, Ordering::Relaxed);
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.load(Ordering::Relaxed))
    }

    /// Grab one frame outside the schedule, bypassing the buffer.
    pub async fn grab_once(&self) -> EnhancerResult<Frame> {
        let sequence = {
            let mut state = lock(&self.state);
            state.sequence += 1;
            state.sequence
        };
        self.grabber.grab(sequence).await
    }

    /// Consuming read at `index` (0 is the oldest).
    pub fn take_frame(&self, index: usize) -> EnhancerResult<Frame> {
        lock(&self.state).buffer.get(index)
    }

    /// Consuming read of the newest frame.
    pub fn take_latest(&self) -> EnhancerResult<Frame> {
        lock(&self.state).buffer.take_latest()
    }

    pub fn peek_frame(&self, index: usize) -> EnhancerResult<Frame> {
        lock(&self.state).buffer.peek(index)
    }

    pub fn latest(&self) -> EnhancerResult<Frame> {
        lock(&self.state).buffer.latest()
    }

    pub fn buffered(&self) -> usize {
        lock(&self.state).buffer.len()
    }

    pub fn clear_buffer(&self) {
        lock(&self.state).buffer.clear();
    }

    pub fn capacity(&self) -> usize {
        lock(&self.state).buffer.capacity()
    }

    pub fn set_capacity(&self, capacity: usize) -> EnhancerResult<()> {
        lock(&self.state).buffer.set_capacity(capacity)
    }

    pub fn refresh_policy(&self) -> RefreshPolicy {
        lock(&self.state).buffer.policy()
    }

    pub fn set_refresh_policy(&self, policy: RefreshPolicy) {
        lock(&self.state).buffer.set_policy(policy);
    }

    /// Time since the newest buffered frame was captured.
    pub fn staleness(&self) -> Option<Duration> {
        lock(&self.state)
            .buffer
            .newest_timestamp()
            .map(|t| t.elapsed())
    }

    pub fn stats(&self) -> LoopStats {
        let state = lock(&self.state);
        LoopStats {
            ticks: state.ticks,
            skipped: state.skipped,
            suppressed: state.suppressed,
            buffer: state.buffer.stats(),
        }
    }
}

impl Drop for AcquisitionLoop {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.task).take() {
            task.abort();
        }
    }
}

fn check_interval(interval: Duration) -> EnhancerResult<u64> {
    let ms = interval.as_millis() as u64;
    if ms == 0 {
        return Err(EnhancerError::config(
            "loopInterval",
            format!("{:?}", interval),
            "must be at least 1ms",
        ));
    }
    Ok(ms)
}

/// What a tick should do, decided under the state lock.
enum TickGate {
    Exit,
    Suppressed,
    Capture(u64),
}

fn gate(state: &Mutex<LoopState>, epoch: u64) -> TickGate {
    let mut state = lock(state);
    if state.epoch != epoch {
        return TickGate::Exit;
    }
    if state.held || state.hidden {
        state.suppressed += 1;
        return TickGate::Suppressed;
    }
    state.ticks += 1;
    state.sequence += 1;
    TickGate::Capture(state.sequence)
}

async fn run(
    grabber: Arc<dyn FrameGrabber>,
    state: Arc<Mutex<LoopState>>,
    interval_ms: Arc<AtomicU64>,
    epoch: u64,
) {
    let mut period_ms = interval_ms.load(Ordering::Relaxed);
    let mut ticker = interval_at(Instant::now(), Duration::from_millis(period_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let sequence = match gate(&state, epoch) {
            TickGate::Exit => break,
            TickGate::Suppressed => continue,
            TickGate::Capture(sequence) => sequence,
        };

        match grabber.grab(sequence).await {
            Ok(frame) => {
                let outcome = {
                    let mut state = lock(&state);
                    if state.epoch != epoch {
                        break;
                    }
                    state.buffer.push(frame)
                };
                match outcome {
                    PushOutcome::Stored | PushOutcome::StoredEvicting => {
                        trace!(sequence, ?outcome, "frame buffered")
                    }
                    PushOutcome::RejectedFull | PushOutcome::RejectedRateLimited => {
                        trace!(sequence, ?outcome, "frame dropped by buffer policy")
                    }
                }
                grabber.frame_delivered();
            }
            Err(e) => {
                let mut state = lock(&state);
                if state.epoch != epoch {
                    break;
                }
                state.skipped += 1;
                drop(state);
                if classify::is_silent(&e) {
                    trace!(sequence, reason = %e, "tick skipped");
                } else {
                    warn!(sequence, error = %e, "tick failed");
                }
            }
        }

        let wanted = interval_ms.load(Ordering::Relaxed);
        if wanted != period_ms {
            period_ms = wanted;
            let period = Duration::from_millis(period_ms);
            ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(interval_ms = period_ms, "loop interval changed");
        }
    }
    trace!(epoch, "fetching loop task exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use scan_geometry::Region;
    use scan_geometry::cpu::PixelRect;

    /// Produces 1x1 frames; fails with `CaptureUnavailable` while `cold`.
    struct CountingGrabber {
        cold: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl FrameGrabber for CountingGrabber {
        async fn grab(&self, sequence: u64) -> EnhancerResult<Frame> {
            if self.cold.load(Ordering::SeqCst) {
                return Err(EnhancerError::capture_unavailable("cold"));
            }
            Ok(Frame {
                data: Arc::from(vec![0u8; 4]),
                width: 1,
                height: 1,
                timestamp: Instant::now(),
                region: Region::full(),
                region_index: None,
                source: PixelRect::full(1, 1),
                is_cropped: false,
                sequence,
                time_spent: Duration::ZERO,
            })
        }
    }

    fn make_loop(cold: bool) -> AcquisitionLoop {
        let grabber = Arc::new(CountingGrabber {
            cold: std::sync::atomic::AtomicBool::new(cold),
        });
        AcquisitionLoop::new(grabber, Duration::from_millis(10), 3, RefreshPolicy::Ring).unwrap()
    }

    #[test]
    fn test_zero_interval_rejected() {
        let grabber = Arc::new(CountingGrabber {
            cold: std::sync::atomic::AtomicBool::new(false),
        });
        assert!(AcquisitionLoop::new(grabber, Duration::ZERO, 3, RefreshPolicy::Ring).is_err());
        let lp = make_loop(false);
        assert!(lp.set_interval(Duration::from_micros(500)).is_err());
        assert_eq!(lp.interval(), Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_fill_ring_buffer() {
        let lp = make_loop(false);
        assert!(lp.start());
        assert!(!lp.start());
        tokio::time::sleep(Duration::from_millis(55)).await;
        assert_eq!(lp.buffered(), 3);
        let newest = lp.latest().unwrap().sequence;
        assert_eq!(lp.peek_frame(0).unwrap().sequence, newest - 2);
        assert!(lp.stop());
        assert_eq!(lp.buffered(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_source_skips_silently() {
        let lp = make_loop(true);
        lp.start();
        tokio::time::sleep(Duration::from_millis(45)).await;
        let stats = lp.stats();
        assert!(stats.skipped >= 4);
        assert_eq!(stats.buffer.accepted, 0);
        assert!(lp.is_started());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hidden_and_held_suppress_ticks() {
        let lp = make_loop(false);
        lp.set_visible(false);
        lp.start();
        assert_eq!(lp.phase(), LoopPhase::Running(RunState::PausedByVisibility));
        assert!(lp.is_started());
        tokio::time::sleep(Duration::from_millis(35)).await;
        assert_eq!(lp.buffered(), 0);

        lp.set_visible(true);
        assert_eq!(lp.phase(), LoopPhase::Running(RunState::Active));
        lp.hold(true);
        tokio::time::sleep(Duration::from_millis(35)).await;
        assert_eq!(lp.buffered(), 0);
        assert!(lp.stats().suppressed >= 6);

        lp.hold(false);
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(lp.buffered() > 0);
    }
}
