//! # Frame Buffer
//!
//! Bounded, index-addressable queue of [`Frame`]s sitting between the
//! acquisition loop (producer, fixed tick rate) and consumers (variable pull
//! rate).
//!
//! ```text
//!   tick ──push──▶ ┌───┬───┬───┬───┐ ──get(i)/latest()──▶ consumer
//!                  │ 0 │ 1 │ 2 │ … │   index 0 is the oldest frame
//!                  └───┴───┴───┴───┘
//! ```
//!
//! ## Overflow policies
//!
//! | `refreshInterval` | Policy | Push into a full buffer |
//! |-------------------|--------|-------------------------|
//! | `0` | [`RefreshPolicy::Ring`] | evicts the oldest frame |
//! | `-1` | [`RefreshPolicy::Latch`] | rejected until a consumer drains |
//! | `> 0` | [`RefreshPolicy::RateLimited`] | evicts the oldest frame, but only one push is accepted per interval regardless of fullness |
//!
//! `get(index)` removes the frame it returns, which is what drains a latched
//! buffer. `peek` and `latest` leave the buffer untouched.
//!
//! The buffer itself is not synchronized; the acquisition loop owns it behind
//! a mutex.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::core::frame::Frame;
use crate::error::{EnhancerError, EnhancerResult};

/// What happens to a push, selected by `refreshInterval`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RefreshPolicy {
    /// FIFO ring: full buffer evicts the oldest frame.
    #[default]
    Ring,
    /// One-shot latch per fill cycle: full buffer rejects pushes.
    Latch,
    /// At most one accepted push per interval, ring eviction on top.
    RateLimited(Duration),
}

impl RefreshPolicy {
    /// Decode the `refreshInterval` setting.
    pub fn from_interval_ms(ms: i64) -> EnhancerResult<Self> {
        match ms {
            0 => Ok(Self::Ring),
            -1 => Ok(Self::Latch),
            ms if ms > 0 => Ok(Self::RateLimited(Duration::from_millis(ms as u64))),
            ms => Err(EnhancerError::config(
                "refreshInterval",
                ms.to_string(),
                "expected -1, 0 or a positive number of milliseconds",
            )),
        }
    }

    /// Inverse of [`RefreshPolicy::from_interval_ms`].
    pub fn as_interval_ms(&self) -> i64 {
        match self {
            Self::Ring => 0,
            Self::Latch => -1,
            Self::RateLimited(d) => d.as_millis() as i64,
        }
    }
}

/// Result of [`FrameBuffer::push`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    Stored,
    /// Stored after evicting the oldest frame.
    StoredEvicting,
    /// Latched buffer is full.
    RejectedFull,
    /// Too soon after the previous accepted push.
    RejectedRateLimited,
}

impl PushOutcome {
    pub fn accepted(&self) -> bool {
        matches!(self, Self::Stored | Self::StoredEvicting)
    }
}

/// Push counters since creation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BufferStats {
    pub accepted: u64,
    pub evicted: u64,
    pub rejected_full: u64,
    pub rejected_rate: u64,
}

#[derive(Debug)]
pub struct FrameBuffer {
    frames: VecDeque<Frame>,
    capacity: usize,
    policy: RefreshPolicy,
    last_accepted: Option<Instant>,
    stats: BufferStats,
}

impl FrameBuffer {
    /// Empty buffer holding at most `capacity` frames (at least 1).
    pub fn new(capacity: usize, policy: RefreshPolicy) -> EnhancerResult<Self> {
        check_capacity(capacity)?;
        Ok(Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
            policy,
            last_accepted: None,
            stats: BufferStats::default(),
        })
    }

    /// Offer a frame to the buffer according to the current policy.
    ///
    /// The rate limiter compares frame timestamps, so it measures time between
    /// captures rather than between calls.
    pub fn push(&mut self, frame: Frame) -> PushOutcome {
        if let (RefreshPolicy::RateLimited(min_gap), Some(last)) = (self.policy, self.last_accepted) {
            if frame.timestamp.saturating_duration_since(last) < min_gap {
                self.stats.rejected_rate += 1;
                return PushOutcome::RejectedRateLimited;
            }
        }

        let mut outcome = PushOutcome::Stored;
        if self.frames.len() >= self.capacity {
            if self.policy == RefreshPolicy::Latch {
                self.stats.rejected_full += 1;
                return PushOutcome::RejectedFull;
            }
            while self.frames.len() >= self.capacity {
                self.frames.pop_front();
                self.stats.evicted += 1;
            }
            outcome = PushOutcome::StoredEvicting;
        }

        self.last_accepted = Some(frame.timestamp);
        self.frames.push_back(frame);
        self.stats.accepted += 1;
        outcome
    }

    /// Remove and return the frame at `index` (0 is the oldest).
    pub fn get(&mut self, index: usize) -> EnhancerResult<Frame> {
        let len = self.frames.len();
        self.frames
            .remove(index)
            .ok_or_else(|| EnhancerError::buffer_empty(Some(index), len))
    }

    /// Remove and return the newest frame.
    pub fn take_latest(&mut self) -> EnhancerResult<Frame> {
        self.frames
            .pop_back()
            .ok_or_else(|| EnhancerError::buffer_empty(None, 0))
    }

    /// Shared view of the frame at `index` without removing it.
    pub fn peek(&self, index: usize) -> EnhancerResult<Frame> {
        self.frames
            .get(index)
            .cloned()
            .ok_or_else(|| EnhancerError::buffer_empty(Some(index), self.frames.len()))
    }

    /// Shared view of the newest frame without removing it.
    pub fn latest(&self) -> EnhancerResult<Frame> {
        self.frames
            .back()
            .cloned()
            .ok_or_else(|| EnhancerError::buffer_empty(None, 0))
    }

    /// Drop every frame and restart the rate-limit window.
    pub fn clear(&mut self) {
        self.frames.clear();
        self.last_accepted = None;
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.frames.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Change the capacity. Shrinking evicts the oldest frames.
    pub fn set_capacity(&mut self, capacity: usize) -> EnhancerResult<()> {
        check_capacity(capacity)?;
        while self.frames.len() > capacity {
            self.frames.pop_front();
            self.stats.evicted += 1;
        }
        self.capacity = capacity;
        Ok(())
    }

    pub fn policy(&self) -> RefreshPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: RefreshPolicy) {
        self.policy = policy;
    }

    pub fn stats(&self) -> BufferStats {
        self.stats
    }

    /// Timestamp of the newest stored frame, for staleness checks.
    pub fn newest_timestamp(&self) -> Option<Instant> {
        self.frames.back().map(|f| f.timestamp)
    }
}

fn check_capacity(capacity: usize) -> EnhancerResult<()> {
    if capacity == 0 {
        return Err(EnhancerError::config(
            "maxNumberOfFramesInBuffer",
            "0",
            "buffer must hold at least one frame",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_geometry::Region;
    use scan_geometry::cpu::PixelRect;
    use std::sync::Arc;

    fn frame(sequence: u64, timestamp: Instant) -> Frame {
        Frame {
            data: Arc::from(vec![sequence as u8; 4]),
            width: 1,
            height: 1,
            timestamp,
            region: Region::full(),
            region_index: None,
            source: PixelRect::full(1, 1),
            is_cropped: false,
            sequence,
            time_spent: Duration::ZERO,
        }
    }

    fn sequences(buffer: &FrameBuffer) -> Vec<u64> {
        (0..buffer.len())
            .map(|i| buffer.peek(i).unwrap().sequence)
            .collect()
    }

    #[test]
    fn test_ring_evicts_oldest() {
        let now = Instant::now();
        let mut buffer = FrameBuffer::new(3, RefreshPolicy::Ring).unwrap();
        for (i, seq) in [0u64, 1, 2, 3].into_iter().enumerate() {
            let outcome = buffer.push(frame(seq, now));
            assert!(outcome.accepted(), "push {}", i);
        }
        assert_eq!(sequences(&buffer), vec![1, 2, 3]);
        assert_eq!(buffer.stats().evicted, 1);
    }

    #[test]
    fn test_latch_rejects_until_drained() {
        let now = Instant::now();
        let mut buffer = FrameBuffer::new(2, RefreshPolicy::Latch).unwrap();
        assert_eq!(buffer.push(frame(0, now)), PushOutcome::Stored);
        assert_eq!(buffer.push(frame(1, now)), PushOutcome::Stored);
        assert_eq!(buffer.push(frame(2, now)), PushOutcome::RejectedFull);
        assert_eq!(sequences(&buffer), vec![0, 1]);

        // Reading removes a frame and frees one slot.
        assert_eq!(buffer.get(0).unwrap().sequence, 0);
        assert_eq!(buffer.push(frame(3, now)), PushOutcome::Stored);
        assert_eq!(sequences(&buffer), vec![1, 3]);

        buffer.clear();
        assert_eq!(buffer.push(frame(4, now)), PushOutcome::Stored);
        assert_eq!(buffer.stats().rejected_full, 1);
    }

    #[test]
    fn test_rate_limit_independent_of_fullness() {
        let t0 = Instant::now();
        let mut buffer =
            FrameBuffer::new(5, RefreshPolicy::RateLimited(Duration::from_millis(100))).unwrap();
        assert!(buffer.push(frame(0, t0)).accepted());
        assert_eq!(
            buffer.push(frame(1, t0 + Duration::from_millis(50))),
            PushOutcome::RejectedRateLimited
        );
        assert!(buffer.push(frame(2, t0 + Duration::from_millis(100))).accepted());
        assert_eq!(sequences(&buffer), vec![0, 2]);
    }

    #[test]
    fn test_rate_limit_applies_ring_eviction() {
        let t0 = Instant::now();
        let mut buffer =
            FrameBuffer::new(2, RefreshPolicy::RateLimited(Duration::from_millis(10))).unwrap();
        for seq in 0..4u64 {
            buffer.push(frame(seq, t0 + Duration::from_millis(seq * 10)));
        }
        assert_eq!(sequences(&buffer), vec![2, 3]);
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let now = Instant::now();
        for policy in [
            RefreshPolicy::Ring,
            RefreshPolicy::Latch,
            RefreshPolicy::RateLimited(Duration::from_millis(1)),
        ] {
            let mut buffer = FrameBuffer::new(4, policy).unwrap();
            for seq in 0..100u64 {
                buffer.push(frame(seq, now + Duration::from_millis(seq)));
                assert!(buffer.len() <= buffer.capacity());
            }
        }
    }

    #[test]
    fn test_out_of_range_reads_report_buffer_empty() {
        let mut buffer = FrameBuffer::new(2, RefreshPolicy::Ring).unwrap();
        assert_eq!(buffer.latest().unwrap_err().category(), "buffer_empty");
        buffer.push(frame(7, Instant::now()));
        let err = buffer.get(1).unwrap_err();
        assert_eq!(err.category(), "buffer_empty");
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.latest().unwrap().sequence, 7);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_shrinking_capacity_drops_oldest() {
        let now = Instant::now();
        let mut buffer = FrameBuffer::new(4, RefreshPolicy::Ring).unwrap();
        for seq in 0..4u64 {
            buffer.push(frame(seq, now));
        }
        buffer.set_capacity(2).unwrap();
        assert_eq!(sequences(&buffer), vec![2, 3]);
        assert!(buffer.set_capacity(0).is_err());
        assert_eq!(buffer.capacity(), 2);
    }

    #[test]
    fn test_policy_round_trip() {
        for ms in [-1i64, 0, 1, 500] {
            assert_eq!(RefreshPolicy::from_interval_ms(ms).unwrap().as_interval_ms(), ms);
        }
        assert!(RefreshPolicy::from_interval_ms(-5).is_err());
    }
}
