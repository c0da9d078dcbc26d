//! Roast event tracker — pure computation over the reading stream.
//!
//! Consumes one [`SensorReading`] per poll cycle and derives:
//!
//! - **T0 (beans added)**: the first reading whose bean temperature falls
//!   more than `beans_added_drop_c` below the previous reading.  Charging
//!   cold beans into a preheated drum produces exactly this kind of sharp
//!   drop.  Fires once; later drops are ignored, and so is any drop after
//!   first crack or drop has been recorded.
//! - **Rate of rise** over a rolling window (see [`ror::RorWindow`]).
//! - **First crack / drop**: write-once events reported from outside.
//! - **Development time** and its percentage of the roast since T0.
//!
//! ```text
//!  T0 ───────────────── first crack ────── drop
//!  │◀──────────── total ──────────────────────▶│
//!                       │◀── development ──────▶│
//! ```
//!
//! The tracker reports numbers only and never commands hardware.

pub mod ror;

use chrono::{DateTime, Utc};
use log::{debug, info};

use crate::config::TrackerConfig;
use crate::error::{Error, Result};
use crate::model::{EventTimestamps, RoastEventKind, RoastMetrics, SensorReading, secs_between};
use crate::safety::WarningMonitor;
use ror::RorWindow;

/// A captured write-once event.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Captured {
    at: DateTime<Utc>,
    temp_c: f64,
}

/// Derives roast events and metrics from a stream of sensor readings.
#[derive(Debug, Clone)]
pub struct RoastEventTracker {
    beans_added_drop_c: f64,
    /// Timestamp of the first accepted reading.
    first_reading_at: Option<DateTime<Utc>>,
    last_reading: Option<SensorReading>,
    beans_added: Option<Captured>,
    first_crack: Option<Captured>,
    drop: Option<Captured>,
    ror: RorWindow,
    monitor: WarningMonitor,
    metrics: RoastMetrics,
}

impl RoastEventTracker {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            beans_added_drop_c: config.beans_added_drop_c,
            first_reading_at: None,
            last_reading: None,
            beans_added: None,
            first_crack: None,
            drop: None,
            ror: RorWindow::new(config.ror_window_secs),
            monitor: WarningMonitor::new(config),
            metrics: RoastMetrics::default(),
        }
    }

    /// Feed one reading and return the recomputed metrics.
    ///
    /// A reading that does not advance past the last accepted timestamp is
    /// ignored (a hardware cache re-serving its last value).
    pub fn update(&mut self, reading: &SensorReading) -> RoastMetrics {
        if let Some(last) = self.last_reading {
            if reading.timestamp <= last.timestamp {
                debug!("tracker: ignoring non-advancing reading at {}", reading.timestamp);
                return self.metrics;
            }
            self.detect_beans_added(last.bean_temp_c, reading);
        }

        self.first_reading_at.get_or_insert(reading.timestamp);
        self.ror.push(reading.timestamp, reading.bean_temp_c);
        self.last_reading = Some(*reading);
        self.recompute();

        let roasting = self.beans_added.is_some() && self.drop.is_none();
        self.monitor
            .evaluate(reading, self.metrics.rate_of_rise_c_per_min, roasting);

        self.metrics
    }

    /// Record first crack.  Write-once: a second report is rejected and the
    /// first value stays intact.
    pub fn report_first_crack(&mut self, at: DateTime<Utc>, temp_c: f64) -> Result<()> {
        if self.first_crack.is_some() {
            return Err(Error::AlreadyReported(RoastEventKind::FirstCrack));
        }
        if !temp_c.is_finite() {
            return Err(Error::validation("first crack temperature must be finite"));
        }
        if let Some(t0) = self.beans_added {
            if at < t0.at {
                return Err(Error::validation("first crack cannot precede beans added"));
            }
        }
        if let Some(drop) = self.drop {
            if at > drop.at {
                return Err(Error::validation("first crack cannot follow drop"));
            }
        }

        self.first_crack = Some(Captured { at, temp_c });
        info!("tracker: first crack at {at} ({temp_c:.1}\u{00b0}C)");
        self.recompute();
        Ok(())
    }

    /// Record drop at the tracker's current time (latest reading).
    pub fn record_drop(&mut self, temp_c: f64) -> Result<DateTime<Utc>> {
        let at = self.now();
        self.record_drop_at(at, temp_c)?;
        Ok(at)
    }

    /// Record drop at an explicit instant.  Write-once.
    pub fn record_drop_at(&mut self, at: DateTime<Utc>, temp_c: f64) -> Result<()> {
        if self.drop.is_some() {
            return Err(Error::AlreadyReported(RoastEventKind::Drop));
        }
        if !temp_c.is_finite() {
            return Err(Error::validation("drop temperature must be finite"));
        }
        let earliest = self.first_crack.or(self.beans_added);
        if let Some(prior) = earliest {
            if at < prior.at {
                return Err(Error::validation("drop cannot precede earlier roast events"));
            }
        }

        self.drop = Some(Captured { at, temp_c });
        info!("tracker: drop at {at} ({temp_c:.1}\u{00b0}C)");
        self.recompute();
        Ok(())
    }

    /// Latest metrics snapshot.
    pub fn metrics(&self) -> RoastMetrics {
        self.metrics
    }

    /// Current warning bitmask (see [`crate::safety::RoastWarning`]).
    pub fn warnings(&self) -> u8 {
        self.monitor.warnings()
    }

    pub fn last_reading(&self) -> Option<SensorReading> {
        self.last_reading
    }

    pub fn event_time(&self, kind: RoastEventKind) -> Option<DateTime<Utc>> {
        let captured = match kind {
            RoastEventKind::BeansAdded => self.beans_added,
            RoastEventKind::FirstCrack => self.first_crack,
            RoastEventKind::Drop => self.drop,
        };
        captured.map(|c| c.at)
    }

    /// Event timestamps, anchored to the owning session's start time.
    pub fn timestamps(&self, session_start: DateTime<Utc>) -> EventTimestamps {
        EventTimestamps {
            session_start,
            beans_added: self.event_time(RoastEventKind::BeansAdded),
            first_crack: self.event_time(RoastEventKind::FirstCrack),
            drop: self.event_time(RoastEventKind::Drop),
        }
    }

    // ── Internal ──────────────────────────────────────────────────

    /// The tracker's notion of "now": the latest reading's timestamp.
    fn now(&self) -> DateTime<Utc> {
        self.last_reading.map_or_else(Utc::now, |r| r.timestamp)
    }

    fn detect_beans_added(&mut self, previous_temp_c: f64, reading: &SensorReading) {
        // T0 may not land after an event it must precede.
        if self.beans_added.is_some() || self.first_crack.is_some() || self.drop.is_some() {
            return;
        }
        if previous_temp_c - reading.bean_temp_c > self.beans_added_drop_c {
            self.beans_added = Some(Captured {
                at: reading.timestamp,
                temp_c: previous_temp_c,
            });
            info!(
                "tracker: beans added at {} ({:.1} -> {:.1}\u{00b0}C)",
                reading.timestamp, previous_temp_c, reading.bean_temp_c
            );
        }
    }

    fn recompute(&mut self) {
        let now = self.now();
        let end = self.drop.map_or(now, |d| d.at);

        let origin = self.beans_added.map(|c| c.at).or(self.first_reading_at);
        let elapsed_s = origin.map_or(0.0, |o| secs_between(o, now).max(0.0));

        let development_time_s = self
            .first_crack
            .map(|fc| secs_between(fc.at, end).max(0.0));

        let development_time_pct = match (self.beans_added, development_time_s) {
            (Some(t0), Some(dev)) => {
                let total = secs_between(t0.at, end);
                (total > 0.0).then(|| dev / total * 100.0)
            }
            _ => None,
        };

        let total_duration_s = match (self.beans_added, self.drop) {
            (Some(t0), Some(drop)) => Some(secs_between(t0.at, drop.at)),
            _ => None,
        };

        self.metrics = RoastMetrics {
            elapsed_s,
            rate_of_rise_c_per_min: self.ror.rate_c_per_min(),
            beans_added_temp_c: self.beans_added.map(|c| c.temp_c),
            first_crack_temp_c: self.first_crack.map(|c| c.temp_c),
            development_time_s,
            development_time_pct,
            drop_temp_c: self.drop.map(|c| c.temp_c),
            total_duration_s,
        };
    }
}
