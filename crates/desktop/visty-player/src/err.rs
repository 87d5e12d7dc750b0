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

use std::path::PathBuf;

use snafu::Snafu;

use crate::state::WindowId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(transparent)]
    Store {
        source: visty_store::Error,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    #[snafu(display("Failed to read directory {}", path.display()))]
    ReadDir {
        path:   PathBuf,
        source: std::io::Error,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    #[snafu(display("No window with id {id}"))]
    UnknownWindow {
        id:  WindowId,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("Window {id} already exists"))]
    DuplicateWindow {
        id:  WindowId,
        #[snafu(implicit)]
        loc: snafu::Location,
    },

    #[snafu(display("Invalid loop range [{start}, {end}]: {reason}"))]
    InvalidLoopRange {
        start:  f64,
        end:    f64,
        reason: &'static str,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    #[snafu(display("Persisted {section} section is malformed"))]
    MalformedState {
        section: &'static str,
        source:  serde_json::Error,
        #[snafu(implicit)]
        loc:     snafu::Location,
    },

    #[snafu(display("{} does not name a file", path.display()))]
    NotAFile {
        path: PathBuf,
        #[snafu(implicit)]
        loc:  snafu::Location,
    },

    #[snafu(display("Window host failed: {message}"))]
    Host {
        message: String,
        #[snafu(implicit)]
        loc:     snafu::Location,
    },

    #[snafu(display("Failed to read config file {}", path.display()))]
    ReadConfig {
        path:   PathBuf,
        source: std::io::Error,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    #[snafu(display("Failed to parse config file {}", path.display()))]
    ParseConfig {
        path:   PathBuf,
        source: serde_json::Error,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },
}
