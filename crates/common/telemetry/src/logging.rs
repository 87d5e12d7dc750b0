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
    env, fmt,
    io::IsTerminal,
    str::FromStr,
    sync::{Once, OnceLock},
};

use bon::Builder;
use serde::{Deserialize, Deserializer, Serialize, de};
use smart_default::SmartDefault;
use tracing::Subscriber;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_log::LogTracer;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, filter, fmt::MakeWriter, layer::SubscriberExt, prelude::*,
    registry::LookupSpan,
};

/// Reads a format name, treating an empty or blank string like a missing
/// value.
///
/// Hand-written config files often carry `"log_format": ""`.
///
/// # Errors
/// Returns an error if the non-empty string does not name a valid value.
pub fn empty_string_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + Default,
    T::Err: fmt::Display,
{
    let raw = String::deserialize(deserializer)?;
    match raw.trim() {
        "" => Ok(T::default()),
        name => name.parse().map_err(de::Error::custom),
    }
}

/// Configuration options for the logging system.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, SmartDefault, Builder)]
#[serde(default)]
pub struct LoggingOptions {
    /// Directory path for storing log files.
    ///
    /// When set to a non-empty string, log files will be created in this
    /// directory with hourly rotation. If empty, only stdout logging is used.
    #[default = ""]
    #[builder(default, into)]
    pub dir: String,

    /// Log level filter string, e.g. `"info"` or `"info,visty_player=debug"`.
    ///
    /// Falls back to `RUST_LOG`, then to `"info"`.
    #[builder(into)]
    pub level: Option<String>,

    /// Output format for log messages.
    #[serde(default, deserialize_with = "empty_string_as_default")]
    #[builder(default)]
    pub log_format: LogFormat,

    /// Maximum number of rotated log files to retain (main and error logs).
    #[default = 72]
    #[builder(default = 72)]
    pub max_log_files: usize,

    /// Whether to output logs to stdout in addition to files.
    #[default = true]
    #[builder(default = true)]
    pub append_stdout: bool,
}

/// Available log output formats.
#[derive(
    Clone, Debug, Copy, PartialEq, Eq, Serialize, Deserialize, Default, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// One JSON object per event, with the current span and span list.
    #[display("json")]
    Json,

    /// Human-readable lines:
    ///
    /// ```text
    /// 2024-01-01T12:00:00.123Z  INFO visty_player::lifecycle: window opened id=3
    /// ```
    #[default]
    #[display("text")]
    Text,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        if name.eq_ignore_ascii_case("json") {
            Ok(Self::Json)
        } else if name.eq_ignore_ascii_case("text") {
            Ok(Self::Text)
        } else {
            Err(format!("unknown log format `{name}`, expected `json` or `text`"))
        }
    }
}

/// Initialize logging for unit tests.
///
/// Logs go to `UNITTEST_LOG_DIR` (default `/tmp/__unittest_logs`) filtered by
/// `UNITTEST_LOG_LEVEL`. Every test may call it; the first call wins and its
/// guards live until the test binary exits.
pub fn init_default_ut_logging() {
    static GUARDS: OnceLock<Vec<WorkerGuard>> = OnceLock::new();

    GUARDS.get_or_init(|| {
        let dir =
            env::var("UNITTEST_LOG_DIR").unwrap_or_else(|_| "/tmp/__unittest_logs".to_string());
        let level = env::var("UNITTEST_LOG_LEVEL")
            .unwrap_or_else(|_| "debug,sqlx=warn,hyper=warn".to_string());
        let opts = LoggingOptions::builder().dir(dir.as_str()).level(level).build();
        let guards = init_global_logging("unittest", &opts);
        tracing::info!(dir, "unit test logging initialized");
        guards
    });
}

const DEFAULT_LOG_TARGETS: &str = "info";

/// Initialize logging with full configuration options.
///
/// # Logging Layers
///
/// - **Stdout Layer**: if `append_stdout` is true
/// - **File Layer**: hourly rotated `visty.*` files if `dir` is set
/// - **Error File Layer**: error-only `visty-err.*` files if `dir` is set
///
/// Only the first call installs a subscriber; later calls return no guards.
///
/// # Panics
///
/// Panics on a log directory that cannot be created or an invalid level
/// string, so that misconfiguration shows up at startup.
pub fn init_global_logging(app_name: &str, opts: &LoggingOptions) -> Vec<WorkerGuard> {
    static START: Once = Once::new();
    let mut guards = vec![];

    START.call_once(|| {
        LogTracer::init().expect("log tracer must be valid");

        let stdout_layer = opts.append_stdout.then(|| {
            let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
            guards.push(guard);
            fmt_layer(writer, opts.log_format, std::io::stdout().is_terminal())
        });

        let file_layer = (!opts.dir.is_empty()).then(|| {
            let (writer, guard) = tracing_appender::non_blocking(rolling_appender(opts, "visty"));
            guards.push(guard);
            fmt_layer(writer, opts.log_format, false)
        });

        let err_file_layer = (!opts.dir.is_empty()).then(|| {
            let (writer, guard) =
                tracing_appender::non_blocking(rolling_appender(opts, "visty-err"));
            guards.push(guard);
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(filter::LevelFilter::ERROR)
                .boxed()
        });

        let filter = opts
            .level
            .as_deref()
            .or(env::var(EnvFilter::DEFAULT_ENV).ok().as_deref())
            .unwrap_or(DEFAULT_LOG_TARGETS)
            .parse::<filter::Targets>()
            .expect("error parsing log level string");

        let subscriber = Registry::default()
            .with(filter)
            .with(stdout_layer)
            .with(file_layer)
            .with(err_file_layer);

        tracing::subscriber::set_global_default(subscriber)
            .expect("error setting global tracing subscriber");

        tracing::debug!(app_name, format = %opts.log_format, "global logging initialized");
    });

    guards
}

/// A `fmt` layer writing to `writer` in the given format.
fn fmt_layer<S, W>(writer: W, format: LogFormat, ansi: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'span> LookupSpan<'span> + 'static,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi);
    match format {
        LogFormat::Json => layer
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .boxed(),
        LogFormat::Text => layer.boxed(),
    }
}

fn rolling_appender(opts: &LoggingOptions, prefix: &str) -> RollingFileAppender {
    RollingFileAppender::builder()
        .rotation(Rotation::HOURLY)
        .filename_prefix(prefix)
        .max_log_files(opts.max_log_files)
        .build(&opts.dir)
        .unwrap_or_else(|e| {
            panic!(
                "initializing rolling file appender at {} failed: {}",
                &opts.dir, e
            )
        })
}
