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

//! Renderer side of one player window.
//!
//! A session binds a [`WindowIndex`] to a replica of the persisted state.
//! User actions mutate the replica and persist the touched section; writes
//! from other windows arrive through storage notifications and replace the
//! replica without being written back.

use std::{
    path::Path,
    sync::{Arc, Weak},
};

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::{
    app_state::AppState,
    bus::{Event, MessageBus, SubscriptionHandle},
    err::{Result, UnknownWindowSnafu},
    host::{ApplicationMenu, CursorPosition, WindowHost},
    media::MediaFile,
    persistence::{Persistence, Section},
    playlist::{self, PlaylistFile},
    sampler::{self, MediaProbe},
    state::{
        ChangeSource, LoadStatus, LoopRange, SettingsPatch, SettingsState, StoreSnapshot,
        WindowId, WindowIndex, WindowPatch, WindowState, WindowStore, Zoom,
    },
    util::ResultExt as _,
};

#[derive(Clone)]
pub struct WindowSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    index:       WindowIndex,
    store:       WindowStore,
    persistence: Persistence,
    bus:         MessageBus,
    host:        Arc<dyn WindowHost>,
    app:         AppState,
    tasks:       Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

impl WindowSession {
    /// Attaches to window `index`.
    ///
    /// The replica is loaded from storage. When `seed` is given it provides
    /// the live flags of a window the main process just materialized, or the
    /// whole entry if storage does not know the window yet. Without a seed
    /// the window must already be persisted.
    #[tracing::instrument(skip(app, host, seed))]
    pub async fn attach(
        app: &AppState,
        host: Arc<dyn WindowHost>,
        index: WindowIndex,
        seed: Option<WindowState>,
    ) -> Result<Self> {
        let id = index.id();
        let store = WindowStore::default();
        let persistence = app.persistence();
        let changes = persistence.subscribe();
        if let Some(snapshot) = persistence.load().await {
            store.replace(snapshot, ChangeSource::Remote);
        }

        match (store.contains(id), seed) {
            (true, Some(seed)) => {
                let live = WindowPatch::builder()
                    .fullscreen(seed.fullscreen)
                    .picture_in_picture(seed.picture_in_picture)
                    .status(seed.status)
                    .build();
                store.update_window_from(id, live, ChangeSource::Remote)?;
            }
            (true, None) => {}
            (false, Some(seed)) => {
                store.create_window(id, seed)?;
                persistence.insert_window(id, &store).await.log_err();
            }
            (false, None) => return UnknownWindowSnafu { id }.fail(),
        }

        let session = Self {
            inner: Arc::new(SessionInner {
                index,
                store: store.clone(),
                persistence: persistence.clone(),
                bus: app.bus(),
                host,
                app: app.clone(),
                tasks: Mutex::new(Vec::new()),
            }),
        };
        let sync = persistence.spawn_sync_with(changes, store, Some(id));
        let events = session.spawn_event_loop();
        session.inner.tasks.lock().extend([sync, events]);

        tracing::debug!(%id, "window session attached");
        Ok(session)
    }

    fn spawn_event_loop(&self) -> JoinHandle<()> {
        let weak: Weak<SessionInner> = Arc::downgrade(&self.inner);
        let mut subscription = self.inner.bus.subscribe_window(self.id());
        tokio::spawn(async move {
            while let Some(envelope) = subscription.recv().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let session = Self { inner };
                session.handle_event(envelope.event).await.log_err();
            }
        })
    }

    pub fn index(&self) -> WindowIndex { self.inner.index }

    pub fn id(&self) -> WindowId { self.inner.index.id() }

    pub fn store(&self) -> &WindowStore { &self.inner.store }

    pub fn window(&self) -> Result<WindowState> { self.inner.store.get_window(self.id()) }

    pub fn settings(&self) -> SettingsState { self.inner.store.get_settings() }

    /// Applies a user action to this window and persists its entry.
    pub async fn update_window(&self, patch: WindowPatch) -> Result<WindowState> {
        let state = self.inner.store.update_window(self.id(), patch)?;
        self.inner
            .persistence
            .save_window(self.id(), &self.inner.store)
            .await
            .log_err();
        Ok(state)
    }

    /// Changes the shared defaults and persists the settings section, which
    /// every other window picks up.
    pub async fn update_settings(&self, patch: SettingsPatch) -> SettingsState {
        let settings = self.inner.store.update_settings(patch);
        self.inner
            .persistence
            .save_section(Section::Settings, &self.inner.store)
            .await
            .log_err();
        settings
    }

    /// Neighbours of `path`; empty when the directory cannot be read.
    pub async fn playlist_file(&self, path: &Path) -> PlaylistFile {
        playlist::resolve_playlist_or_empty(path).await
    }

    /// Neighbours of the file this window is showing.
    pub async fn current_playlist(&self) -> PlaylistFile {
        match self.window().ok().and_then(|window| window.file) {
            Some(file) => self.playlist_file(&file.path).await,
            None => PlaylistFile::default(),
        }
    }

    /// Asks this window to load `path` by broadcasting `changeFile`.
    pub fn open_file(&self, path: &Path) -> Result<()> {
        let file = MediaFile::from_path(path)?;
        self.inner.bus.publish_to(self.id(), Event::ChangeFile { file });
        Ok(())
    }

    pub async fn change_file(&self, file: MediaFile) -> Result<WindowState> {
        tracing::info!(id = %self.id(), path = %file.path.display(), "loading file");
        self.update_window(WindowPatch::builder().file(file).build()).await
    }

    /// Switches to the next file of the directory. Returns the new file, if
    /// there was one.
    pub async fn next_track(&self) -> Result<Option<MediaFile>> {
        let Some(next) = self.current_playlist().await.next else {
            return Ok(None);
        };
        self.change_file(next.clone()).await?;
        Ok(Some(next))
    }

    pub async fn previous_track(&self) -> Result<Option<MediaFile>> {
        let Some(previous) = self.current_playlist().await.previous else {
            return Ok(None);
        };
        self.change_file(previous.clone()).await?;
        Ok(Some(previous))
    }

    /// The media element loaded the current file.
    pub async fn mark_loaded(&self, duration: f64) -> Result<WindowState> {
        let patch = WindowPatch::builder()
            .status(LoadStatus::Loaded)
            .duration(duration)
            .build();
        self.update_window(patch).await
    }

    /// The media element failed to load the current file. Only this window
    /// shows the failure.
    pub async fn mark_failed(&self) -> Result<WindowState> {
        tracing::warn!(id = %self.id(), "failed to load file");
        self.update_window(WindowPatch::builder().status(LoadStatus::Error).build())
            .await
    }

    /// Derives the native menu from this window and hands it to the host
    /// when this window has focus.
    pub async fn update_application_menu(&self) -> Result<ApplicationMenu> {
        let window = self.window()?;
        let playlist = self.current_playlist().await;
        let menu = ApplicationMenu::new(self.id(), &window, &self.settings(), &playlist);
        if self.inner.host.focused().is_none_or(|focused| focused == self.id()) {
            self.inner.host.set_application_menu(&menu);
        }
        Ok(menu)
    }

    pub fn cursor_position(&self) -> CursorPosition { self.inner.host.cursor_position() }

    /// Calls `handler` with the new state whenever another window's write
    /// replaced this replica.
    pub fn on_storage_change<F>(&self, mut handler: F) -> SubscriptionHandle
    where
        F: FnMut(&StoreSnapshot) + Send + 'static,
    {
        let store = self.inner.store.clone();
        let mut changes = store.subscribe();
        let task = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(event) if event.source == ChangeSource::Remote => handler(&store.snapshot()),
                    Ok(_) | Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        SubscriptionHandle::new(task)
    }

    /// Starts mirroring `probe` into this window's state.
    pub fn start_sampler(&self, probe: Arc<dyn MediaProbe>) {
        let period = self.inner.app.config().app.sample_interval();
        let task = sampler::spawn_sampler(self.inner.store.clone(), self.id(), probe, period);
        self.inner.tasks.lock().push(task);
    }

    /// Applies one bus event to this window.
    pub async fn handle_event(&self, event: Event) -> Result<()> {
        tracing::debug!(id = %self.id(), kind = %event.kind(), "handling event");
        match event {
            Event::ChangeFile { file } => {
                self.change_file(file).await?;
            }
            Event::ToggleLoop => {
                self.toggle(|w| WindowPatch::builder().loop_enabled(!w.loop_enabled).build())
                    .await?;
            }
            Event::ToggleMute => {
                self.toggle(|w| WindowPatch::builder().muted(!w.muted).build()).await?;
            }
            Event::ToggleAutoplay => {
                self.toggle(|w| WindowPatch::builder().autoplay(!w.autoplay).build())
                    .await?;
            }
            Event::ToggleFullscreen => {
                self.toggle(|w| WindowPatch::builder().fullscreen(!w.fullscreen).build())
                    .await?;
            }
            Event::TogglePictureInPicture => {
                self.toggle(|w| {
                    WindowPatch::builder()
                        .picture_in_picture(!w.picture_in_picture)
                        .build()
                })
                .await?;
            }
            Event::ZoomIn => {
                self.toggle(|w| WindowPatch::builder().zoom(w.zoom.zoom_in()).build()).await?;
            }
            Event::ZoomOut => {
                self.toggle(|w| WindowPatch::builder().zoom(w.zoom.zoom_out()).build()).await?;
            }
            Event::ResetZoom => {
                self.update_window(WindowPatch::builder().zoom(Zoom::MIN).build()).await?;
            }
            Event::SetPlaybackRate { rate } => {
                self.update_window(WindowPatch::builder().playback_rate(rate).build())
                    .await?;
            }
            Event::SetLoopRange { start, end } => {
                let range = LoopRange::new(start, end, self.window()?.duration)?;
                self.update_window(WindowPatch::builder().loop_range(Some(range)).build())
                    .await?;
            }
            Event::ClearLoopRange => {
                self.update_window(WindowPatch::builder().loop_range(None).build()).await?;
            }
            Event::NextTrack => {
                self.next_track().await?;
            }
            Event::PreviousTrack => {
                self.previous_track().await?;
            }
            Event::SetDefaultViewMode { view_mode_on_open } => {
                self.update_settings(
                    SettingsPatch::builder().view_mode_on_open(view_mode_on_open).build(),
                )
                .await;
            }
            Event::SetDefaultLoop { value } => {
                self.update_settings(SettingsPatch::builder().default_loop(value).build())
                    .await;
            }
            Event::SetDefaultMuted { value } => {
                self.update_settings(SettingsPatch::builder().default_muted(value).build())
                    .await;
            }
            Event::SetDefaultAutoplay { value } => {
                self.update_settings(SettingsPatch::builder().default_autoplay(value).build())
                    .await;
            }
            Event::SetDefaultVolume { volume } => {
                self.update_settings(SettingsPatch::builder().default_volume(volume).build())
                    .await;
            }
            Event::WindowOpened { .. } | Event::WindowClosed { .. } => return Ok(()),
        }

        self.update_application_menu().await.map(|_| ())
    }

    async fn toggle(&self, patch: impl FnOnce(&WindowState) -> WindowPatch) -> Result<WindowState> {
        let window = self.window()?;
        self.update_window(patch(&window)).await
    }

    /// Stops every background task and drops the replica.
    pub fn dispose(&self) {
        for task in self.inner.tasks.lock().drain(..) {
            task.abort();
        }
        self.inner.store.dispose();
        tracing::debug!(id = %self.id(), "window session disposed");
    }
}
