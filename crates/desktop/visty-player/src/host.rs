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

//! Seam to the windowing host, which owns native windows, menus and the
//! pointer. The core never creates windows itself.

use async_trait::async_trait;
use serde::Serialize;

use crate::{
    err::Result,
    playlist::PlaylistFile,
    state::{SettingsState, ViewMode, WindowId, WindowState},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CursorPosition {
    pub x: f64,
    pub y: f64,
}

/// Checkbox and enabled state of the native application menu.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationMenu {
    pub window:             Option<WindowId>,
    pub has_file:           bool,
    pub has_previous:       bool,
    pub has_next:           bool,
    pub loop_enabled:       bool,
    pub partial_loop:       bool,
    pub muted:              bool,
    pub autoplay:           bool,
    pub fullscreen:         bool,
    pub picture_in_picture: bool,
    pub playback_rate:      f64,
    pub zoom:               f64,
    pub default_loop:       bool,
    pub default_muted:      bool,
    pub default_autoplay:   bool,
    pub view_mode_on_open:  ViewMode,
}

impl ApplicationMenu {
    pub fn new(
        id: WindowId,
        window: &WindowState,
        settings: &SettingsState,
        playlist: &PlaylistFile,
    ) -> Self {
        Self {
            window:             Some(id),
            has_file:           window.file.is_some(),
            has_previous:       playlist.previous.is_some(),
            has_next:           playlist.next.is_some(),
            loop_enabled:       window.loop_enabled,
            partial_loop:       window.loop_range.is_some(),
            muted:              window.muted,
            autoplay:           window.autoplay,
            fullscreen:         window.fullscreen,
            picture_in_picture: window.picture_in_picture,
            playback_rate:      window.playback_rate.value(),
            zoom:               window.zoom.value(),
            default_loop:       settings.default_loop,
            default_muted:      settings.default_muted,
            default_autoplay:   settings.default_autoplay,
            view_mode_on_open:  settings.view_mode_on_open,
        }
    }
}

/// Native window management provided by the embedding application.
#[async_trait]
pub trait WindowHost: Send + Sync {
    /// Materializes a window for `id`, seeded with `seed`.
    async fn create(&self, id: WindowId, seed: &WindowState) -> Result<()>;

    /// Destroys the window for `id`. Unknown ids are ignored.
    async fn close(&self, id: WindowId);

    /// Restores native window geometry after persisted windows were created.
    async fn restore_all(&self) {}

    /// Saves native window geometry before shutdown.
    async fn save_all(&self) {}

    fn focused(&self) -> Option<WindowId> { None }

    fn cursor_position(&self) -> CursorPosition { CursorPosition::default() }

    fn set_application_menu(&self, _menu: &ApplicationMenu) {}
}
