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
use smart_default::SmartDefault;

use super::values::Volume;

/// How a window presents itself when a file is opened.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::EnumString,
    strum_macros::AsRefStr,
    strum_macros::Display,
    strum_macros::EnumIter,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ViewMode {
    Fullscreen,
    Maximized,
    #[default]
    Default,
}

/// Defaults shared by every window, applied to newly opened files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SmartDefault)]
#[serde(default, rename_all = "camelCase")]
pub struct SettingsState {
    pub default_loop:      bool,
    pub default_muted:     bool,
    #[default(_code = "Volume::MAX")]
    pub default_volume:    Volume,
    #[default = true]
    pub default_autoplay:  bool,
    pub view_mode_on_open: ViewMode,
}

/// A field-wise update of [`SettingsState`]. Unset fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Builder)]
pub struct SettingsPatch {
    pub default_loop:      Option<bool>,
    pub default_muted:     Option<bool>,
    #[builder(into)]
    pub default_volume:    Option<Volume>,
    pub default_autoplay:  Option<bool>,
    pub view_mode_on_open: Option<ViewMode>,
}

impl SettingsPatch {
    pub const fn is_empty(&self) -> bool {
        self.default_loop.is_none()
            && self.default_muted.is_none()
            && self.default_volume.is_none()
            && self.default_autoplay.is_none()
            && self.view_mode_on_open.is_none()
    }
}

impl SettingsState {
    pub fn apply(&mut self, patch: SettingsPatch) {
        if let Some(value) = patch.default_loop {
            self.default_loop = value;
        }
        if let Some(value) = patch.default_muted {
            self.default_muted = value;
        }
        if let Some(value) = patch.default_volume {
            self.default_volume = value;
        }
        if let Some(value) = patch.default_autoplay {
            self.default_autoplay = value;
        }
        if let Some(value) = patch.view_mode_on_open {
            self.view_mode_on_open = value;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn merge_keeps_unspecified_fields() {
        let mut settings = SettingsState { default_loop: true, ..Default::default() };
        settings.apply(SettingsPatch::builder().default_volume(0.4).build());

        assert!(settings.default_loop);
        assert!((settings.default_volume.value() - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn wire_names_are_camel_case() {
        let json = serde_json::to_value(SettingsState::default()).unwrap();
        assert_eq!(json["viewModeOnOpen"], "default");
        assert_eq!(json["defaultVolume"], 1.0);
        assert_eq!(ViewMode::from_str("fullscreen").unwrap(), ViewMode::Fullscreen);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let settings: SettingsState = serde_json::from_str(r#"{"defaultMuted":true}"#).unwrap();
        assert!(settings.default_muted);
        assert!(settings.default_autoplay);
    }
}
