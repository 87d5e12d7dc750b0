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

use bon::Builder;
use serde::{Deserialize, Serialize};

use super::{
    settings::{SettingsState, ViewMode},
    values::{LoopRange, PlaybackRate, Volume, Zoom},
};
use crate::{
    err::{InvalidLoopRangeSnafu, Result},
    media::MediaFile,
};

/// Identifier of a player window, unique for the lifetime of the process.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::FromStr,
)]
#[serde(transparent)]
pub struct WindowId(u64);

impl WindowId {
    pub const fn new(id: u64) -> Self { Self(id) }

    pub const fn get(self) -> u64 { self.0 }
}

/// The window a renderer is bound to. Fixed for the renderer's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub struct WindowIndex(WindowId);

impl WindowIndex {
    pub const fn new(id: WindowId) -> Self { Self(id) }

    pub const fn id(self) -> WindowId { self.0 }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LoadStatus {
    Loading,
    #[default]
    Loaded,
    Error,
}

/// Playback state of one window.
///
/// Live flags (fullscreen, picture-in-picture, status, duration) are not
/// persisted; they are recomputed when the window is materialized again.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WindowState {
    pub file:               Option<MediaFile>,
    #[serde(rename = "loop")]
    pub loop_enabled:       bool,
    pub loop_range:         Option<LoopRange>,
    pub playback_rate:      PlaybackRate,
    pub zoom:               Zoom,
    pub volume:             Volume,
    pub muted:              bool,
    pub autoplay:           bool,
    pub current_time:       f64,
    #[serde(skip)]
    pub duration:           Option<f64>,
    #[serde(skip)]
    pub fullscreen:         bool,
    #[serde(skip)]
    pub picture_in_picture: bool,
    #[serde(skip)]
    pub status:             LoadStatus,
}

impl WindowState {
    /// State for a freshly opened window, taking its defaults from `settings`.
    pub fn seeded(file: Option<MediaFile>, settings: &SettingsState) -> Self {
        let status = if file.is_some() { LoadStatus::Loading } else { LoadStatus::Loaded };
        Self {
            file,
            loop_enabled: settings.default_loop,
            volume: settings.default_volume,
            muted: settings.default_muted,
            autoplay: settings.default_autoplay,
            fullscreen: settings.view_mode_on_open == ViewMode::Fullscreen,
            status,
            ..Default::default()
        }
    }

    /// Turns a persisted entry into a seed. Persisted choices are kept and
    /// live flags start over.
    #[must_use]
    pub fn restored(self) -> Self {
        let status = if self.file.is_some() { LoadStatus::Loading } else { LoadStatus::Loaded };
        Self {
            duration: None,
            fullscreen: false,
            picture_in_picture: false,
            status,
            ..self
        }
    }

    /// Applies `patch` in place, all or nothing.
    pub fn apply(&mut self, patch: WindowPatch) -> Result<()> {
        let mut next = self.clone();
        let file_changed = patch
            .file
            .as_ref()
            .is_some_and(|file| next.file.as_ref() != Some(file));

        if let Some(file) = patch.file {
            next.file = Some(file);
        }
        if file_changed {
            next.loop_range = None;
            next.current_time = 0.0;
            next.duration = None;
            next.status = LoadStatus::Loading;
        }
        if let Some(duration) = patch.duration {
            next.duration = Some(duration);
            if next.loop_range.is_some_and(|range| !range.fits(duration)) {
                next.loop_range = None;
            }
        }
        if let Some(range) = patch.loop_range {
            if let (Some(range), Some(duration)) = (range, next.duration) {
                if !range.fits(duration) {
                    return InvalidLoopRangeSnafu {
                        start:  range.start(),
                        end:    range.end(),
                        reason: "end is past the media duration",
                    }
                    .fail();
                }
            }
            next.loop_range = range;
        }
        if let Some(value) = patch.loop_enabled {
            next.loop_enabled = value;
        }
        if let Some(value) = patch.playback_rate {
            next.playback_rate = value;
        }
        if let Some(value) = patch.zoom {
            next.zoom = value;
        }
        if let Some(value) = patch.volume {
            next.volume = value;
        }
        if let Some(value) = patch.muted {
            next.muted = value;
        }
        if let Some(value) = patch.autoplay {
            next.autoplay = value;
        }
        if let Some(value) = patch.current_time {
            next.current_time = value.max(0.0);
        }
        if let Some(value) = patch.fullscreen {
            next.fullscreen = value;
        }
        if let Some(value) = patch.picture_in_picture {
            next.picture_in_picture = value;
        }
        if let Some(value) = patch.status {
            next.status = value;
        }

        *self = next;
        Ok(())
    }
}

/// A field-wise update of [`WindowState`]. Unset fields keep their value.
///
/// `loop_range: Some(None)` clears the partial loop. Switching to another
/// file drops the loop range and the playback position unless the same patch
/// sets them.
#[derive(Debug, Clone, Default, PartialEq, Builder)]
pub struct WindowPatch {
    pub file:               Option<MediaFile>,
    pub loop_enabled:       Option<bool>,
    pub loop_range:         Option<Option<LoopRange>>,
    #[builder(into)]
    pub playback_rate:      Option<PlaybackRate>,
    #[builder(into)]
    pub zoom:               Option<Zoom>,
    #[builder(into)]
    pub volume:             Option<Volume>,
    pub muted:              Option<bool>,
    pub autoplay:           Option<bool>,
    pub current_time:       Option<f64>,
    pub duration:           Option<f64>,
    pub fullscreen:         Option<bool>,
    pub picture_in_picture: Option<bool>,
    pub status:             Option<LoadStatus>,
}
