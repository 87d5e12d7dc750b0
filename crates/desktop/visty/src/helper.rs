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

use std::{
    collections::HashMap,
    io::{self, IsTerminal},
    path::Path,
    sync::OnceLock,
};

use jiff::Timestamp;
use visty_common_telemetry::logging::LoggingOptions;

static STARTUP_TIME: OnceLock<Timestamp> = OnceLock::new();

const FORCE_CLI_MODE_ENV_VAR_NAME: &str = "VISTY_FORCE_CLI_MODE";

#[inline]
pub(crate) fn startup_time() -> Timestamp { *STARTUP_TIME.get_or_init(Timestamp::now) }

pub(crate) fn init_paths() -> HashMap<io::ErrorKind, Vec<&'static Path>> {
    [
        visty_paths::config_dir(),
        visty_paths::database_dir(),
        visty_paths::logs_dir(),
        visty_paths::temp_dir(),
    ]
    .into_iter()
    .fold(HashMap::default(), |mut errors, path| {
        if let Err(e) = std::fs::create_dir_all(path) {
            errors.entry(e.kind()).or_insert_with(Vec::new).push(path);
        }
        errors
    })
}

pub(crate) fn files_not_created_on_launch(errors: HashMap<io::ErrorKind, Vec<&Path>>) -> String {
    let details = errors
        .into_iter()
        .filter_map(|(kind, paths)| {
            #[allow(unused_mut)] // for non-unix platforms
            let mut details = match paths.as_slice() {
                [] => return None,
                [path] => format!("{kind} when creating directory {}", path.display()),
                many => format!("{kind} when creating directories {many:?}"),
            };

            #[cfg(unix)]
            {
                if kind == io::ErrorKind::PermissionDenied {
                    details.push_str(
                        "\n\nConsider using chown and chmod tools for altering the directories \
                         permissions if your user has corresponding rights.",
                    );
                }
            }

            Some(details)
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!("Visty failed to launch: {details}")
}

pub(crate) fn stdout_is_a_pty() -> bool {
    std::env::var(FORCE_CLI_MODE_ENV_VAR_NAME).ok().is_none() && io::stdout().is_terminal()
}

/// Logging for the player itself: rolling files in the logs directory unless
/// the config names another one.
pub(crate) fn player_logging(configured: &LoggingOptions) -> LoggingOptions {
    let mut options = configured.clone();
    if options.dir.is_empty() {
        options.dir = visty_paths::logs_dir().to_string_lossy().into_owned();
    }
    options.append_stdout = options.append_stdout && stdout_is_a_pty();
    options
}

/// Logging for one-shot commands: warnings to stdout only.
pub(crate) fn command_logging() -> LoggingOptions {
    LoggingOptions::builder().level("warn").build()
}
