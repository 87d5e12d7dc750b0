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

mod helper;
mod host;

use std::{io::BufRead, path::PathBuf};

use clap::{Args, Parser, Subcommand};
use snafu::{ResultExt, Whatever, whatever};
use visty_common_telemetry::logging::init_global_logging;
use visty_player::{
    AppConfig, AppState, MessageBus, SettingsPatch, ViewMode, WindowId, WindowManager,
    WindowStore, persistence::Section, resolve_playlist, state::ChangeSource,
};

use crate::host::HeadlessHost;

#[derive(Debug, Parser)]
#[clap(
    name = "visty",
    about = "A media player that remembers every window",
    version
)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Run(RunArgs),
    Playlist(PlaylistArgs),
    Windows(WindowsArgs),
    Settings(SettingsArgs),
    Close(CloseArgs),
}

fn load_config() -> Result<AppConfig, Whatever> {
    let path = visty_paths::config_file();
    let config = AppConfig::load(path)
        .with_whatever_context(|_| format!("invalid config file {}", path.display()))?;
    Ok(config.with_database_path(visty_paths::database_file()))
}

async fn open_app(config: AppConfig) -> Result<AppState, Whatever> {
    let errors = helper::init_paths();
    if !errors.is_empty() {
        whatever!("{}", helper::files_not_created_on_launch(errors));
    }
    AppState::new(config)
        .await
        .whatever_context("failed to open the visty database")
}

/// Loads the persisted state into a fresh store, for one-shot edits.
async fn load_store(app: &AppState) -> WindowStore {
    let store = WindowStore::default();
    if let Some(snapshot) = app.persistence().load().await {
        store.replace(snapshot, ChangeSource::Remote);
    }
    store
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r#"

Starts the player: restores the windows of the last run, opens FILES in new
windows and keeps running until interrupted. Each line read from stdin is a
JSON event envelope delivered to the windows.
Examples:

visty run
visty run ~/Movies/clip.mp4
echo '{"version":1,"target":1,"event":{"type":"toggleMute"}}' | visty run

"#)]
struct RunArgs {
    /// Media files to open, one window each.
    files: Vec<PathBuf>,
}

impl RunArgs {
    async fn run(&self) -> Result<(), Whatever> {
        helper::startup_time();
        let config = load_config()?;
        let _guards = init_global_logging("visty", &helper::player_logging(&config.logging));
        visty_common_telemetry::set_panic_hook();
        tracing::info!(
            "========== starting visty version {} at {} ==========",
            env!("CARGO_PKG_VERSION"),
            helper::startup_time(),
        );

        let app = open_app(config).await?;
        let host = HeadlessHost::new(app.clone());
        let manager = WindowManager::new(&app, host.clone());
        manager.start_sync();

        let restored = manager.restore().await;
        for file in &self.files {
            match manager.open_path(file).await {
                Ok(id) => println!("opened {} in window {id}", file.display()),
                Err(e) => eprintln!("cannot open {}: {e}", file.display()),
            }
        }
        println!(
            "{} window(s) open ({} restored), press Ctrl-C to quit",
            host.window_ids().len(),
            restored.len()
        );

        forward_stdin_events(app.bus());
        tokio::signal::ctrl_c()
            .await
            .whatever_context("failed to listen for Ctrl-C")?;

        let saved = manager.shutdown().await;
        host.dispose_all();
        app.db().close().await;
        saved.whatever_context("failed to save player state")?;
        tracing::info!("visty stopped");
        Ok(())
    }
}

/// Publishes every stdin line as an event envelope until stdin closes.
///
/// Runs on a plain thread: a blocking stdin read cannot be cancelled and
/// would hold up runtime shutdown.
fn forward_stdin_events(bus: MessageBus) {
    let spawned = std::thread::Builder::new()
        .name("stdin-events".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) if line.trim().is_empty() => {}
                    Ok(line) => {
                        if !bus.publish_raw(&line) {
                            eprintln!("ignored event: {line}");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "stopped reading events from stdin");
                        break;
                    }
                }
            }
        });
    if let Err(e) = spawned {
        tracing::warn!(error = %e, "cannot read events from stdin");
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Prints the previous and next media files next to FILE.
Examples:

visty playlist ~/Music/track.mp3

")]
struct PlaylistArgs {
    file: PathBuf,
}

impl PlaylistArgs {
    async fn run(&self) -> Result<(), Whatever> {
        let _guards = init_global_logging("visty", &helper::command_logging());
        let playlist = resolve_playlist(&self.file)
            .await
            .with_whatever_context(|_| format!("cannot list {}", self.file.display()))?;
        let show = |file: Option<visty_player::MediaFile>| {
            file.map_or_else(|| "-".to_string(), |file| file.path.display().to_string())
        };
        println!("previous: {}", show(playlist.previous));
        println!("next:     {}", show(playlist.next));
        Ok(())
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Lists the windows that will be restored on the next run.
Examples:

visty windows

")]
struct WindowsArgs {}

impl WindowsArgs {
    async fn run(&self) -> Result<(), Whatever> {
        let _guards = init_global_logging("visty", &helper::command_logging());
        let app = open_app(load_config()?).await?;
        let store = load_store(&app).await;
        for id in store.window_ids() {
            let Ok(window) = store.get_window(id) else {
                continue;
            };
            let file = window
                .file
                .map_or_else(|| "(empty)".to_string(), |file| file.path.display().to_string());
            println!(
                "{id}\t{file}\tvolume={:.2} muted={} loop={} zoom={:.2} rate={:.2}",
                window.volume.value(),
                window.muted,
                window.loop_enabled,
                window.zoom.value(),
                window.playback_rate.value(),
            );
        }
        app.db().close().await;
        Ok(())
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Shows the default settings applied to newly opened files, or changes them.
Running players pick up the change within a moment.
Examples:

visty settings
visty settings --default-muted true --default-volume 0.5

")]
struct SettingsArgs {
    #[arg(long)]
    default_volume:   Option<f64>,
    #[arg(long)]
    default_loop:     Option<bool>,
    #[arg(long)]
    default_muted:    Option<bool>,
    #[arg(long)]
    default_autoplay: Option<bool>,
    /// fullscreen, maximized or default
    #[arg(long)]
    view_mode:        Option<ViewMode>,
}

impl SettingsArgs {
    fn patch(&self) -> SettingsPatch {
        SettingsPatch {
            default_loop:      self.default_loop,
            default_muted:     self.default_muted,
            default_volume:    self.default_volume.map(Into::into),
            default_autoplay:  self.default_autoplay,
            view_mode_on_open: self.view_mode,
        }
    }

    async fn run(&self) -> Result<(), Whatever> {
        let _guards = init_global_logging("visty", &helper::command_logging());
        let app = open_app(load_config()?).await?;
        let store = load_store(&app).await;

        let patch = self.patch();
        if !patch.is_empty() {
            store.update_settings(patch);
            app.persistence()
                .save_section(Section::Settings, &store)
                .await
                .whatever_context("failed to save settings")?;
        }

        let settings = serde_json::to_string_pretty(&store.get_settings())
            .whatever_context("failed to print settings")?;
        println!("{settings}");
        app.db().close().await;
        Ok(())
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Forgets a persisted window so it is not restored on the next run.
Examples:

visty close 3

")]
struct CloseArgs {
    id: WindowId,
}

impl CloseArgs {
    async fn run(&self) -> Result<(), Whatever> {
        let _guards = init_global_logging("visty", &helper::command_logging());
        let app = open_app(load_config()?).await?;
        let removed = app
            .persistence()
            .remove_window(self.id)
            .await
            .whatever_context("failed to save windows")?;

        if removed {
            println!("window {} closed", self.id);
        } else {
            println!("no window {}", self.id);
        }
        app.db().close().await;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Whatever> {
    let cli = Cli::parse();
    match cli.commands {
        Commands::Run(ra) => ra.run().await,
        Commands::Playlist(pa) => pa.run().await,
        Commands::Windows(wa) => wa.run().await,
        Commands::Settings(sa) => sa.run().await,
        Commands::Close(ca) => ca.run().await,
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_well_formed() { Cli::command().debug_assert(); }

    #[test]
    fn settings_flags_become_a_patch() {
        let cli = Cli::parse_from([
            "visty",
            "settings",
            "--default-muted",
            "true",
            "--view-mode",
            "fullscreen",
        ]);
        let Commands::Settings(args) = cli.commands else {
            panic!("expected the settings command");
        };
        let patch = args.patch();
        assert_eq!(patch.default_muted, Some(true));
        assert_eq!(patch.view_mode_on_open, Some(ViewMode::Fullscreen));
        assert_eq!(patch.default_loop, None);
    }
}
