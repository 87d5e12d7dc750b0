// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bounded playback values.
//!
//! Out-of-range inputs are clamped instead of rejected: a slider or a
//! hand-edited persisted value that overshoots still yields a usable state.
//! The exception is [`LoopRange`], whose bounds are validated.

use serde::{Deserialize, Serialize};

use crate::err::{InvalidLoopRangeSnafu, Result};

fn clamp_or(value: f64, min: f64, max: f64, fallback: f64) -> f64 {
    if value.is_nan() { fallback } else { value.clamp(min, max) }
}

/// Output volume in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct Volume(f64);

impl Volume {
    pub const MAX: Self = Self(1.0);
    pub const MIN: Self = Self(0.0);

    pub fn new(value: f64) -> Self { Self(clamp_or(value, 0.0, 1.0, 1.0)) }

    pub const fn value(self) -> f64 { self.0 }
}

impl Default for Volume {
    fn default() -> Self { Self::MAX }
}

impl From<f64> for Volume {
    fn from(value: f64) -> Self { Self::new(value) }
}

impl From<Volume> for f64 {
    fn from(volume: Volume) -> Self { volume.0 }
}

/// Zoom factor in `[1, 10]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct Zoom(f64);

impl Zoom {
    pub const MAX: Self = Self(10.0);
    pub const MIN: Self = Self(1.0);
    pub const STEP: f64 = 0.25;

    pub fn new(value: f64) -> Self { Self(clamp_or(value, Self::MIN.0, Self::MAX.0, 1.0)) }

    pub const fn value(self) -> f64 { self.0 }

    #[must_use]
    pub fn zoom_in(self) -> Self { Self::new(self.0 + Self::STEP) }

    #[must_use]
    pub fn zoom_out(self) -> Self { Self::new(self.0 - Self::STEP) }
}

impl Default for Zoom {
    fn default() -> Self { Self::MIN }
}

impl From<f64> for Zoom {
    fn from(value: f64) -> Self { Self::new(value) }
}

impl From<Zoom> for f64 {
    fn from(zoom: Zoom) -> Self { zoom.0 }
}

/// Playback speed multiplier in `[0.25, 4]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(from = "f64", into = "f64")]
pub struct PlaybackRate(f64);

impl PlaybackRate {
    pub const MAX: Self = Self(4.0);
    pub const MIN: Self = Self(0.25);
    pub const NORMAL: Self = Self(1.0);

    pub fn new(value: f64) -> Self { Self(clamp_or(value, Self::MIN.0, Self::MAX.0, 1.0)) }

    pub const fn value(self) -> f64 { self.0 }
}

impl Default for PlaybackRate {
    fn default() -> Self { Self::NORMAL }
}

impl From<f64> for PlaybackRate {
    fn from(value: f64) -> Self { Self::new(value) }
}

impl From<PlaybackRate> for f64 {
    fn from(rate: PlaybackRate) -> Self { rate.0 }
}

/// A partial loop `[start, end]` in seconds.
///
/// Always satisfies `0 <= start < end`. The upper bound against the media
/// duration is checked when the duration is known.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "(f64, f64)", into = "(f64, f64)")]
pub struct LoopRange {
    start: f64,
    end:   f64,
}

impl LoopRange {
    /// Validates a loop range. Inverted or empty ranges are rejected, never
    /// swapped.
    pub fn new(start: f64, end: f64, duration: Option<f64>) -> Result<Self> {
        let reason = if !start.is_finite() || !end.is_finite() {
            Some("bounds must be finite")
        } else if start < 0.0 {
            Some("start is negative")
        } else if start >= end {
            Some("start must be before end")
        } else if duration.is_some_and(|duration| end > duration) {
            Some("end is past the media duration")
        } else {
            None
        };

        match reason {
            Some(reason) => InvalidLoopRangeSnafu { start, end, reason }.fail(),
            None => Ok(Self { start, end }),
        }
    }

    pub const fn start(&self) -> f64 { self.start }

    pub const fn end(&self) -> f64 { self.end }

    pub fn fits(&self, duration: f64) -> bool { self.end <= duration }

    pub fn contains(&self, time: f64) -> bool { time >= self.start && time < self.end }
}

impl TryFrom<(f64, f64)> for LoopRange {
    type Error = crate::err::Error;

    fn try_from((start, end): (f64, f64)) -> Result<Self> { Self::new(start, end, None) }
}

impl From<LoopRange> for (f64, f64) {
    fn from(range: LoopRange) -> Self { (range.start, range.end) }
}
