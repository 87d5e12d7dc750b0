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

//! Visty Player - window lifecycle and playback-state core of the visty
//! media player
//!
//! The main process drives a [`WindowManager`]; every player window runs a
//! [`WindowSession`] over its own replica of the persisted state. Replicas
//! converge through storage-change notifications, while transient commands
//! travel over the [`MessageBus`].

pub mod config;

pub use config::{AppConfig, ApplicationConfig};

pub mod app_state;

pub use app_state::AppState;

pub mod err;

pub use err::{Error, Result};

pub mod state;

pub use state::{
    ChangeSource, LoadStatus, LoopRange, PlaybackRate, SettingsPatch, SettingsState,
    StoreSnapshot, ViewMode, Volume, WindowId, WindowIndex, WindowPatch, WindowState,
    WindowStore, Zoom,
};

pub mod media;
pub mod playlist;

pub use media::MediaFile;
pub use playlist::{PlaylistFile, resolve_playlist};

pub mod bus;
pub mod persistence;

pub use bus::{Event, MessageBus};
pub use persistence::Persistence;

pub mod host;
pub mod lifecycle;
pub mod sampler;
pub mod session;

pub use host::{ApplicationMenu, CursorPosition, WindowHost};
pub use lifecycle::WindowManager;
pub use session::WindowSession;

pub mod util;
