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

//! In-memory state of the player: one entry per window plus the shared
//! default settings.

mod settings;
mod store;
mod values;
mod window;

pub use settings::{SettingsPatch, SettingsState, ViewMode};
pub use store::{ChangeSource, StoreChange, StoreEvent, StoreSnapshot, WindowStore};
pub use values::{LoopRange, PlaybackRate, Volume, Zoom};
pub use window::{LoadStatus, WindowId, WindowIndex, WindowPatch, WindowState};
