//! Rolling rate-of-rise window.
//!
//! Holds `(timestamp, bean_temp)` samples spanning at most `window_secs`.
//! Samples older than the window (relative to the newest) are evicted on
//! every push.  Capacity is fixed so a very fast poll rate cannot grow the
//! buffer without bound; when full, the oldest sample goes first.

use chrono::{DateTime, Utc};
use heapless::Deque;

use crate::model::secs_between;

/// Hard cap on retained samples (enough for a 60 s window at 8 Hz).
const MAX_SAMPLES: usize = 512;

#[derive(Debug, Clone, Copy)]
struct Sample {
    at: DateTime<Utc>,
    temp_c: f64,
}

/// Rate-of-rise calculator over a rolling time window.
#[derive(Debug, Clone)]
pub struct RorWindow {
    window_secs: f64,
    samples: Deque<Sample, MAX_SAMPLES>,
}

impl RorWindow {
    pub fn new(window_secs: u32) -> Self {
        Self {
            window_secs: f64::from(window_secs),
            samples: Deque::new(),
        }
    }

    /// Append a sample and evict everything older than the window.
    pub fn push(&mut self, at: DateTime<Utc>, temp_c: f64) {
        if self.samples.is_full() {
            self.samples.pop_front();
        }
        // Cannot fail: a slot was freed above if needed.
        let _ = self.samples.push_back(Sample { at, temp_c });

        while let Some(oldest) = self.samples.front() {
            if secs_between(oldest.at, at) > self.window_secs {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// °C/min between the oldest and newest sample.
    ///
    /// `None` with fewer than two samples or a zero time span.
    pub fn rate_c_per_min(&self) -> Option<f64> {
        if self.samples.len() < 2 {
            return None;
        }
        let oldest = self.samples.front()?;
        let newest = self.samples.back()?;
        let span_s = secs_between(oldest.at, newest.at);
        if span_s <= 0.0 {
            return None;
        }
        Some((newest.temp_c - oldest.temp_c) / (span_s / 60.0))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
