//! What happens after a song finishes: the inter-track gap and the choice of
//! the next song.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayMode {
    #[default]
    Single,
    SingleRepeat,
    ListOrdered,
    ListRepeat,
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuationAction {
    Stop,
    /// Seek the current song to its start and play it again.
    Replay,
    Load(usize),
}

/// Picks the follow-up for a finished song. `current` is the playlist index
/// of the song that just ended.
pub fn next_action<R: Rng + ?Sized>(
    mode: PlayMode,
    current: Option<usize>,
    len: usize,
    rng: &mut R,
) -> ContinuationAction {
    if len == 0 {
        return ContinuationAction::Stop;
    }
    let next = current.map_or(0, |c| c + 1);
    match mode {
        PlayMode::Single => ContinuationAction::Stop,
        PlayMode::SingleRepeat => ContinuationAction::Replay,
        PlayMode::ListOrdered if next < len => ContinuationAction::Load(next),
        PlayMode::ListOrdered => ContinuationAction::Stop,
        PlayMode::ListRepeat if next < len => ContinuationAction::Load(next),
        PlayMode::ListRepeat => ContinuationAction::Load(0),
        PlayMode::Random if len == 1 => ContinuationAction::Replay,
        PlayMode::Random => match current {
            Some(c) if c < len => {
                // uniform over every index except the current one
                let pick = rng.gen_range(0..len - 1);
                ContinuationAction::Load(if pick >= c { pick + 1 } else { pick })
            }
            _ => ContinuationAction::Load(rng.gen_range(0..len)),
        },
    }
}

/// An inter-track pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitWindow {
    pub start: Instant,
    pub end: Instant,
}

impl WaitWindow {
    pub fn new(start: Instant, gap: Duration) -> Self {
        Self {
            start,
            end: start + gap,
        }
    }

    pub fn is_waiting(&self, now: Instant) -> bool {
        now < self.end
    }

    /// Fraction of the gap already elapsed, in `0.0..=1.0`.
    pub fn progress(&self, now: Instant) -> f32 {
        let total = self.end.saturating_duration_since(self.start);
        if total.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.start);
        (elapsed.as_secs_f32() / total.as_secs_f32()).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Elapsed,
    /// Ended early; the continuation proceeds.
    Skipped,
    /// The continuation is abandoned.
    Cancelled,
}

#[derive(Debug, Default)]
struct WaiterState {
    window: Mutex<Option<WaitWindow>>,
    cancelled: AtomicBool,
    skipped: AtomicBool,
}

/// Cancellable sleep-poll used between tracks. Clones share state, so one
/// handle can wait while another cancels.
#[derive(Debug, Clone, Default)]
pub struct GapWaiter {
    state: Arc<WaiterState>,
}

impl GapWaiter {
    pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks for `gap`, polling every [`Self::POLL_INTERVAL`]. Only a
    /// cancel or skip issued while this wait runs ends it early.
    pub fn wait(&self, gap: Duration) -> WaitOutcome {
        self.state.cancelled.store(false, Ordering::SeqCst);
        self.state.skipped.store(false, Ordering::SeqCst);
        let window = WaitWindow::new(Instant::now(), gap);
        *self.state.window.lock() = Some(window);
        debug!("waiting {:?} before continuing", gap);

        loop {
            if self.state.cancelled.load(Ordering::SeqCst)
                || self.state.skipped.load(Ordering::SeqCst)
            {
                break;
            }
            let now = Instant::now();
            if !window.is_waiting(now) {
                break;
            }
            thread::sleep(Self::POLL_INTERVAL.min(window.end - now));
        }

        *self.state.window.lock() = None;
        if self.state.cancelled.swap(false, Ordering::SeqCst) {
            WaitOutcome::Cancelled
        } else if self.state.skipped.swap(false, Ordering::SeqCst) {
            WaitOutcome::Skipped
        } else {
            WaitOutcome::Elapsed
        }
    }

    /// No effect when no wait is running.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn skip(&self) {
        self.state.skipped.store(true, Ordering::SeqCst);
    }

    pub fn window(&self) -> Option<WaitWindow> {
        *self.state.window.lock()
    }

    pub fn is_waiting(&self) -> bool {
        self.window().is_some_and(|w| w.is_waiting(Instant::now()))
    }

    /// 1.0 when idle.
    pub fn progress(&self) -> f32 {
        self.window().map_or(1.0, |w| w.progress(Instant::now()))
    }
}
