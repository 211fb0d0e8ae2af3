//! # Stream Freshness Module
//!
//! Per-stream fallback policy. Each real data stream (position fixes, sensor
//! frames) carries one `StreamFreshness` that decides, once per tick, whether
//! the tick must be filled with synthetic data.
//!
//! ```text
//!            real update                 tick
//!   Stale ───────────────► Live    Stale ─────► Synthetic
//!     ▲                     │                     │
//!     │ window elapsed      │                     │ real update
//!     │ or provider error   │                     ▼
//!     └─────────────────────┘                   Live
//! ```

use std::time::Duration;
use tokio::time::Instant;

/// Freshness of one real data stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// A real update arrived within the staleness window
    Live,
    /// No real update within the window, or the source reported an error
    Stale,
    /// Ticks are being filled from the synthetic generator
    Synthetic,
}

#[derive(Debug, Clone)]
pub struct StreamFreshness {
    state: StreamState,
    last_real: Option<Instant>,
    window: Duration,
}

impl StreamFreshness {
    /// New stream that has never produced real data
    pub fn new(window: Duration) -> Self {
        Self {
            state: StreamState::Stale,
            last_real: None,
            window,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn last_real(&self) -> Option<Instant> {
        self.last_real
    }

    /// Record an accepted real update
    pub fn mark_live(&mut self, now: Instant) {
        self.state = StreamState::Live;
        self.last_real = Some(now);
    }

    /// Record a provider or link error; the next tick goes synthetic
    pub fn mark_unavailable(&mut self) {
        if self.state == StreamState::Live {
            self.state = StreamState::Stale;
        }
    }

    /// Re-evaluate the staleness window without ticking
    pub fn refresh(&mut self, now: Instant) -> StreamState {
        if self.state == StreamState::Live {
            let fresh = self
                .last_real
                .map(|t| now.saturating_duration_since(t) <= self.window)
                .unwrap_or(false);
            if !fresh {
                self.state = StreamState::Stale;
            }
        }
        self.state
    }

    /// Decide this tick: `true` means draw a synthetic sample
    pub fn tick(&mut self, now: Instant) -> bool {
        match self.refresh(now) {
            StreamState::Live => false,
            StreamState::Stale | StreamState::Synthetic => {
                self.state = StreamState::Synthetic;
                true
            }
        }
    }

    /// Forget all history, as at session start
    pub fn reset(&mut self) {
        self.state = StreamState::Stale;
        self.last_real = None;
    }
}
