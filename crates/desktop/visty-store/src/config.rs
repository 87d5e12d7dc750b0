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

use std::{path::PathBuf, time::Duration};

use smart_default::SmartDefault;

/// Database configuration
#[derive(Debug, Clone, SmartDefault, bon::Builder)]
#[builder(on(Duration, into))]
pub struct DatabaseConfig {
    /// Path to the SQLite database file
    #[default(_code = "PathBuf::from(\"visty.db\")")]
    #[builder(default = PathBuf::from("visty.db"), into, getter)]
    pub db_path: PathBuf,

    /// Maximum number of connections in the pool
    #[default = 4]
    #[builder(default = 4, getter)]
    pub max_connections: u32,

    /// Connection timeout (default: 30 seconds)
    #[default(_code = "Duration::from_secs(30)")]
    #[builder(default = Duration::from_secs(30), getter)]
    pub connect_timeout: Duration,

    /// Idle timeout for connections (default: 10 minutes)
    #[default(_code = "Some(Duration::from_secs(600))")]
    #[builder(getter)]
    pub idle_timeout: Option<Duration>,

    /// Number of storage-change notifications buffered per subscriber
    /// before the slowest one starts missing them.
    #[default = 64]
    #[builder(default = 64, getter)]
    pub change_capacity: usize,

    /// How often the database is checked for writes made by other
    /// processes. Zero turns the check off.
    #[default(_code = "Duration::from_millis(250)")]
    #[builder(default = Duration::from_millis(250), getter)]
    pub watch_interval: Duration,
}
