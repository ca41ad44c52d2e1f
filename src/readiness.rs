//! Readiness aggregation and the delay time value
//!
//! The sweep may only start when the viewer lays pages out vertically, shows
//! one page at a time, sits on page 1, and the configured render delay is in
//! range. The check is pure and recomputed after every observation.

use crate::error::{Error, Result};
use crate::position::PositionReport;
use crate::settings::SettingsReport;
use std::fmt;
use std::time::Duration;

/// Shortest accepted render delay
pub const MIN_DELAY_MS: u64 = 2_000;
/// Longest accepted render delay
pub const MAX_DELAY_MS: u64 = 20_000;
/// Delay used when no preference is stored
pub const DEFAULT_DELAY_MS: u64 = 2_000;

/// Time to wait after scrolling a page into view before encoding it.
///
/// The viewer gives no signal when a canvas has finished rendering, so this
/// is a fixed wait. Pages exported too early come out blank; a longer delay
/// makes that less likely but never impossible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DelayTime(u64);

impl DelayTime {
    /// Validate a delay given in milliseconds
    pub fn from_millis(ms: u64) -> Result<Self> {
        if (MIN_DELAY_MS..=MAX_DELAY_MS).contains(&ms) {
            Ok(Self(ms))
        } else {
            Err(Error::DelayOutOfRange(ms as f64 / 1000.0))
        }
    }

    /// Validate a delay given in seconds, as typed by the user
    pub fn from_seconds(seconds: f64) -> Result<Self> {
        let ms = seconds * 1000.0;
        if delay_in_range(ms) {
            Ok(Self(ms.round() as u64))
        } else {
            Err(Error::DelayOutOfRange(seconds))
        }
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(self.0)
    }

    pub fn as_seconds(&self) -> f64 {
        self.0 as f64 / 1000.0
    }
}

impl Default for DelayTime {
    fn default() -> Self {
        Self(DEFAULT_DELAY_MS)
    }
}

impl fmt::Display for DelayTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_seconds(self.as_seconds()))
    }
}

/// `2.0` prints as `2`, `2.5` as `2.5`
pub fn format_seconds(seconds: f64) -> String {
    if seconds.fract() == 0.0 && seconds.is_finite() {
        format!("{}", seconds as i64)
    } else {
        format!("{}", seconds)
    }
}

/// Whether a delay in milliseconds is inside the accepted range (NaN is not)
pub fn delay_in_range(ms: f64) -> bool {
    ms >= MIN_DELAY_MS as f64 && ms <= MAX_DELAY_MS as f64
}

/// Combine the observer verdicts and the delay check into one decision
pub fn compute_ready(settings: &SettingsReport, position: &PositionReport, delay_ms: f64) -> bool {
    settings.page_transition_ok && settings.spread_double_ok && delay_in_range(delay_ms) && position.on_first_page
}

/// Human-readable list of the checks that currently fail
pub fn blockers(settings: &SettingsReport, position: &PositionReport, delay_ms: f64) -> Vec<&'static str> {
    let mut out = Vec::new();
    if !settings.page_transition_ok {
        out.push("page transition is not vertical");
    }
    if !settings.spread_double_ok {
        out.push("spread double is not off");
    }
    if !delay_in_range(delay_ms) {
        out.push("delay is outside 2-20 seconds");
    }
    if !position.on_first_page {
        out.push("viewer is not on page 1");
    }
    out
}
