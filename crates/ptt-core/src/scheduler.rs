//! Display-refresh scheduling for the level meter loop.
//!
//! A frame is requested, then later reported as due exactly once unless it
//! was cancelled first. Cancelled frames never come due.

use std::time::{Duration, Instant};

pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(u64);

pub trait FrameScheduler {
    fn request_frame(&mut self) -> FrameId;
    fn cancel_frame(&mut self, id: FrameId);

    /// Removes and returns every frame whose tick has arrived.
    fn due_frames(&mut self) -> Vec<FrameId>;
}

/// Ticks on a fixed interval measured from the moment a frame is requested.
#[derive(Debug)]
pub struct IntervalFrameScheduler {
    interval: Duration,
    next_id: u64,
    pending: Vec<(FrameId, Instant)>,
}

impl IntervalFrameScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_id: 0,
            pending: Vec::new(),
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.iter().map(|(_, deadline)| *deadline).min()
    }

    fn due_at(&mut self, now: Instant) -> Vec<FrameId> {
        let mut due = Vec::new();
        self.pending.retain(|(id, deadline)| {
            if *deadline <= now {
                due.push(*id);
                false
            } else {
                true
            }
        });
        due
    }
}

impl Default for IntervalFrameScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_INTERVAL)
    }
}

impl FrameScheduler for IntervalFrameScheduler {
    fn request_frame(&mut self) -> FrameId {
        let id = FrameId(self.next_id);
        self.next_id += 1;
        self.pending.push((id, Instant::now() + self.interval));
        id
    }

    fn cancel_frame(&mut self, id: FrameId) {
        self.pending.retain(|(pending, _)| *pending != id);
    }

    fn due_frames(&mut self) -> Vec<FrameId> {
        self.due_at(Instant::now())
    }
}

/// Frames come due whenever the owner drains them, e.g. from its own vsync.
#[derive(Debug, Default)]
pub struct ManualFrameScheduler {
    next_id: u64,
    pending: Vec<FrameId>,
    requested: usize,
    cancelled: usize,
}

impl ManualFrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> &[FrameId] {
        &self.pending
    }

    pub fn requested(&self) -> usize {
        self.requested
    }

    pub fn cancelled(&self) -> usize {
        self.cancelled
    }
}

impl FrameScheduler for ManualFrameScheduler {
    fn request_frame(&mut self) -> FrameId {
        let id = FrameId(self.next_id);
        self.next_id += 1;
        self.requested += 1;
        self.pending.push(id);
        id
    }

    fn cancel_frame(&mut self, id: FrameId) {
        let before = self.pending.len();
        self.pending.retain(|pending| *pending != id);
        if self.pending.len() != before {
            self.cancelled += 1;
        }
    }

    fn due_frames(&mut self) -> Vec<FrameId> {
        std::mem::take(&mut self.pending)
    }
}
