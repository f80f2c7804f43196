//! Rotation state machine.
//!
//! Pure and clock-agnostic: every operation takes the current monotonic
//! instant, so the same read drives both the advance decision and the
//! progress value. The async driver lives in `tasks::rotation`.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::model::{MAX_SLIDE_DURATION, MIN_SLIDE_DURATION};
use crate::slides::Slide;

#[derive(Debug)]
pub struct Rotation {
    duration: Duration,
    carry_index: bool,
    last_index: usize,
    state: State,
}

#[derive(Debug)]
enum State {
    Idle,
    Rotating(Window),
}

#[derive(Debug)]
struct Window {
    slides: Arc<[Slide]>,
    index: usize,
    started: Instant,
    progress: f32,
}

/// Outcome of [`Rotation::poll`].
#[derive(Debug, Clone, PartialEq)]
pub enum RotationPoll {
    Idle,
    Progress { index: usize, percent: f32 },
    Advanced { index: usize, slide: Slide },
}

impl Rotation {
    pub fn new(duration: Duration, carry_index: bool) -> Self {
        Self {
            duration: clamp_duration(duration),
            carry_index,
            last_index: 0,
            state: State::Idle,
        }
    }

    /// Enter (or re-enter) rotation over `slides`.
    ///
    /// Returns the slide that opens the new window. Handing back the sequence
    /// that is already rotating is not a transition and returns `None`; an
    /// empty sequence moves to idle.
    pub fn load(&mut self, slides: Arc<[Slide]>, now: Instant) -> Option<(usize, Slide)> {
        if let State::Rotating(window) = &self.state {
            if Arc::ptr_eq(&window.slides, &slides) {
                return None;
            }
        }
        if slides.is_empty() {
            self.stop();
            return None;
        }
        let index = if self.carry_index {
            self.last_index % slides.len()
        } else {
            0
        };
        let slide = slides[index].clone();
        self.last_index = index;
        self.state = State::Rotating(Window {
            slides,
            index,
            started: now,
            progress: 0.0,
        });
        Some((index, slide))
    }

    /// Change the period. A real change restarts the current window.
    pub fn set_duration(&mut self, duration: Duration, now: Instant) -> bool {
        let duration = clamp_duration(duration);
        if duration == self.duration {
            return false;
        }
        self.duration = duration;
        if let State::Rotating(window) = &mut self.state {
            window.started = now;
            window.progress = 0.0;
        }
        true
    }

    pub fn stop(&mut self) {
        if let State::Rotating(window) = &self.state {
            self.last_index = window.index;
        }
        self.state = State::Idle;
    }

    /// Evaluate the window at `now`: advance once the period has fully
    /// elapsed since the last reset, otherwise report progress.
    pub fn poll(&mut self, now: Instant) -> RotationPoll {
        let duration = self.duration;
        let State::Rotating(window) = &mut self.state else {
            return RotationPoll::Idle;
        };
        let elapsed = now.saturating_duration_since(window.started);
        if elapsed >= duration {
            window.index = (window.index + 1) % window.slides.len();
            window.started = now;
            window.progress = 0.0;
            self.last_index = window.index;
            return RotationPoll::Advanced {
                index: window.index,
                slide: window.slides[window.index].clone(),
            };
        }
        let percent = (elapsed.as_secs_f64() / duration.as_secs_f64() * 100.0).min(100.0) as f32;
        window.progress = window.progress.max(percent);
        RotationPoll::Progress {
            index: window.index,
            percent: window.progress,
        }
    }

    /// When the current window ends, if rotating.
    pub fn deadline(&self) -> Option<Instant> {
        match &self.state {
            State::Rotating(window) => Some(window.started + self.duration),
            State::Idle => None,
        }
    }

    pub fn is_rotating(&self) -> bool {
        matches!(self.state, State::Rotating(_))
    }

    pub fn index(&self) -> Option<usize> {
        match &self.state {
            State::Rotating(window) => Some(window.index),
            State::Idle => None,
        }
    }

    pub fn progress(&self) -> Option<f32> {
        match &self.state {
            State::Rotating(window) => Some(window.progress),
            State::Idle => None,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

fn clamp_duration(duration: Duration) -> Duration {
    duration.clamp(MIN_SLIDE_DURATION, MAX_SLIDE_DURATION)
}
