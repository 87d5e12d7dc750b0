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

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use snafu::ResultExt;
use visty_common_telemetry::logging::LoggingOptions;
use visty_store::DatabaseConfig;

use crate::err::{ParseConfigSnafu, ReadConfigSnafu, Result};

/// Application configuration
#[derive(Debug, Clone, Default, bon::Builder)]
pub struct AppConfig {
    /// Database configuration
    #[builder(default, getter)]
    pub database: DatabaseConfig,
    /// Application-level configuration
    #[builder(default, getter)]
    pub app:      ApplicationConfig,
    /// Logging configuration
    #[builder(default, getter)]
    pub logging:  LoggingOptions,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SmartDefault, bon::Builder)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Storage key of the persisted player state.
    #[default = "persist:visty"]
    #[builder(default = "persist:visty".to_string(), into)]
    pub storage_key: String,

    /// Events buffered per bus subscriber before it starts missing them.
    #[default = 256]
    #[builder(default = 256)]
    pub bus_capacity: usize,

    /// Tick of the live-media sampler, in milliseconds. Zero is read as 1.
    #[default = 250]
    #[builder(default = 250)]
    pub sample_interval_ms: u64,

    /// Recreate the windows of the previous run at startup.
    #[default = true]
    #[builder(default = true)]
    pub restore_windows: bool,
}

impl ApplicationConfig {
    pub const fn sample_interval(&self) -> Duration {
        match self.sample_interval_ms {
            0 => MIN_SAMPLE_INTERVAL,
            ms => Duration::from_millis(ms),
        }
    }
}

const MIN_SAMPLE_INTERVAL: Duration = Duration::from_millis(1);

/// The parts of [`AppConfig`] a user may override in `config.json`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    app:     ApplicationConfig,
    logging: LoggingOptions,
}

impl AppConfig {
    /// Reads overrides from a JSON file. A missing file yields the defaults;
    /// an unreadable or malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let file = match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str::<ConfigFile>(&text).context(ParseConfigSnafu { path })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => ConfigFile::default(),
            Err(e) => return Err(e).context(ReadConfigSnafu { path }),
        };

        Ok(Self {
            database: DatabaseConfig::default(),
            app:      file.app,
            logging:  file.logging,
        })
    }

    #[must_use]
    pub fn with_database_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.database.db_path = path.into();
        self
    }
}
