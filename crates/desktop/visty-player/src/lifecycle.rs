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

//! Main-process side of window management: allocating ids, seeding state,
//! restoring the previous run and flushing state at shutdown.

use std::{
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::Mutex;
use tokio::{
    sync::{
        Mutex as AsyncMutex,
        broadcast::{self, error::TryRecvError},
    },
    task::JoinHandle,
};

use crate::{
    app_state::AppState,
    bus::{Event, MessageBus},
    err::Result,
    host::WindowHost,
    media::MediaFile,
    persistence::{PendingChanges, Persistence},
    state::{ChangeSource, StoreEvent, StoreSnapshot, WindowId, WindowState, WindowStore},
    util::ResultExt as _,
};

/// Owns creation and removal of window entries.
///
/// Keeps a store mirroring the persisted slot, so new windows are seeded
/// from the latest settings whichever window changed them. Only the edits
/// made to that store in this process are ever written back; entries the
/// windows persist themselves are left as stored.
pub struct WindowManager {
    host:        Arc<dyn WindowHost>,
    store:       WindowStore,
    persistence: Persistence,
    bus:         MessageBus,
    restore:     bool,
    next_id:     AtomicU64,
    sync:        Mutex<Option<JoinHandle<()>>>,
    local:       AsyncMutex<broadcast::Receiver<StoreEvent>>,
}

impl WindowManager {
    pub fn new(app: &AppState, host: Arc<dyn WindowHost>) -> Self {
        let store = WindowStore::default();
        let local = AsyncMutex::new(store.subscribe());
        Self {
            host,
            store,
            local,
            persistence: app.persistence(),
            bus: app.bus(),
            restore: app.config().app.restore_windows,
            next_id: AtomicU64::new(1),
            sync: Mutex::new(None),
        }
    }

    pub const fn store(&self) -> &WindowStore { &self.store }

    pub fn host(&self) -> Arc<dyn WindowHost> { Arc::clone(&self.host) }

    fn allocate_id(&self) -> WindowId { WindowId::new(self.next_id.fetch_add(1, Ordering::Relaxed)) }

    /// Opens a new window, blank when `file` is `None`. A file already shown
    /// by another window still gets a window of its own.
    #[tracing::instrument(skip_all, fields(file = ?file.as_ref().map(|f| &f.path)))]
    pub async fn open(&self, file: Option<MediaFile>) -> Result<WindowId> {
        let id = self.allocate_id();
        let seed = WindowState::seeded(file, &self.store.get_settings());
        self.store.create_window(id, seed.clone())?;
        // the window loads its state from storage, so it must be there first
        self.flush().await.log_err();

        if let Err(e) = self.host.create(id, &seed).await {
            self.store.remove_window(id);
            self.flush().await.log_err();
            return Err(e);
        }

        self.bus.publish(Event::WindowOpened { id });
        tracing::info!(%id, "window opened");
        Ok(id)
    }

    pub async fn open_path(&self, path: &Path) -> Result<WindowId> {
        let file = MediaFile::from_path(path)?;
        self.open(Some(file)).await
    }

    /// Loads `path` into `target` if it is an open window, otherwise opens a
    /// new window for it.
    pub async fn open_file(&self, target: Option<WindowId>, path: &Path) -> Result<WindowId> {
        let file = MediaFile::from_path(path)?;
        match target.filter(|id| self.store.contains(*id)) {
            Some(id) => {
                self.bus.publish_to(id, Event::ChangeFile { file });
                Ok(id)
            }
            None => self.open(Some(file)).await,
        }
    }

    /// Closes a window and forgets its state. Closing twice is harmless.
    #[tracing::instrument(skip(self))]
    pub async fn close(&self, id: WindowId) {
        self.forget(id).await;
        self.host.close(id).await;
    }

    /// Called by the host when the user closed a window natively.
    pub async fn window_closed(&self, id: WindowId) { self.forget(id).await; }

    async fn forget(&self, id: WindowId) {
        if self.store.remove_window(id) {
            self.flush().await.log_err();
            self.bus.publish(Event::WindowClosed { id });
            tracing::info!(%id, "window closed");
        }
    }

    /// Loads the previous run's state and asks the host to materialize one
    /// window per persisted entry, seeded with what was saved. Entries the
    /// host fails to create are dropped. Returns the restored ids.
    #[tracing::instrument(skip(self))]
    pub async fn restore(&self) -> Vec<WindowId> {
        let Some(snapshot) = self.persistence.load().await else {
            tracing::debug!("nothing to restore");
            return Vec::new();
        };
        let StoreSnapshot { settings, windows } = snapshot;
        let windows = if self.restore { windows } else { Default::default() };

        if let Some(last) = windows.keys().next_back() {
            self.next_id.fetch_max(last.get() + 1, Ordering::Relaxed);
        }
        let seeds: Vec<_> = windows
            .iter()
            .map(|(id, state)| (*id, state.clone().restored()))
            .collect();
        self.store.replace(
            StoreSnapshot {
                settings,
                windows: seeds.iter().cloned().collect(),
            },
            ChangeSource::Remote,
        );

        let mut restored = Vec::with_capacity(seeds.len());
        for (id, seed) in seeds {
            match self.host.create(id, &seed).await {
                Ok(()) => restored.push(id),
                Err(e) => {
                    tracing::warn!(%id, error = %e, "failed to restore window");
                    self.store.remove_window(id);
                }
            }
        }
        self.host.restore_all().await;

        if restored.len() != windows.len() {
            self.flush().await.log_err();
        }
        tracing::info!(count = restored.len(), "windows restored");
        restored
    }

    /// Keeps this manager's store in step with writes made by the windows.
    pub fn start_sync(&self) {
        let mut sync = self.sync.lock();
        if sync.is_none() {
            *sync = Some(self.persistence.spawn_sync(self.store.clone()));
        }
    }

    /// Writes the edits made to this manager's store since the last flush,
    /// merged into the stored slot.
    async fn flush(&self) -> Result<()> {
        let mut local = self.local.lock().await;
        let mut pending = PendingChanges::default();
        loop {
            match local.try_recv() {
                Ok(event) => pending.record(event),
                Err(TryRecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "local changes lagged, saving everything");
                    pending.mark_all();
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        self.persistence.save_changes(&self.store, &pending).await
    }

    /// Flushes host geometry, then every pending edit, so that the stored
    /// slot holds the current state of all windows. Completes before
    /// returning.
    #[tracing::instrument(skip(self))]
    pub async fn save(&self) -> Result<()> {
        self.host.save_all().await;
        self.flush().await
    }

    /// Saves, then stops the sync task.
    pub async fn shutdown(&self) -> Result<()> {
        let result = self.save().await;
        if let Some(task) = self.sync.lock().take() {
            task.abort();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;
    use crate::{
        config::AppConfig,
        err::{Error, HostSnafu},
        state::{SettingsPatch, WindowPatch, Zoom},
    };

    #[derive(Default)]
    struct RecordingHost {
        created: parking_lot::Mutex<BTreeMap<WindowId, WindowState>>,
        closed:  parking_lot::Mutex<Vec<WindowId>>,
        refuse:  Option<WindowId>,
    }

    #[async_trait]
    impl WindowHost for RecordingHost {
        async fn create(&self, id: WindowId, seed: &WindowState) -> Result<()> {
            if self.refuse == Some(id) {
                return HostSnafu { message: "no display" }.fail();
            }
            self.created.lock().insert(id, seed.clone());
            Ok(())
        }

        async fn close(&self, id: WindowId) { self.closed.lock().push(id); }
    }

    async fn app(tempdir: &TempDir) -> AppState {
        let config = AppConfig::default().with_database_path(tempdir.path().join("visty.db"));
        AppState::new(config).await.unwrap()
    }

    #[tokio::test]
    async fn open_seeds_from_settings_and_persists() {
        let tempdir = TempDir::new().unwrap();
        let app = app(&tempdir).await;
        let host = Arc::new(RecordingHost::default());
        let manager = WindowManager::new(&app, host.clone());
        manager
            .store()
            .update_settings(SettingsPatch::builder().default_muted(true).build());

        let id = manager.open_path(Path::new("/media/a.mp4")).await.unwrap();
        assert!(host.created.lock()[&id].muted);

        let persisted = app.persistence().load().await.unwrap();
        assert!(persisted.windows.contains_key(&id));
    }

    #[tokio::test]
    async fn same_file_opens_twice() {
        let tempdir = TempDir::new().unwrap();
        let app = app(&tempdir).await;
        let manager = WindowManager::new(&app, Arc::new(RecordingHost::default()));

        let first = manager.open_path(Path::new("/media/a.mp4")).await.unwrap();
        let second = manager.open_path(Path::new("/media/a.mp4")).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(manager.store().window_ids().len(), 2);
    }

    #[tokio::test]
    async fn close_removes_the_entry() {
        let tempdir = TempDir::new().unwrap();
        let app = app(&tempdir).await;
        let host = Arc::new(RecordingHost::default());
        let manager = WindowManager::new(&app, host.clone());

        let id = manager.open(None).await.unwrap();
        manager.close(id).await;
        manager.close(id).await;

        assert!(matches!(manager.store().get_window(id), Err(Error::UnknownWindow { .. })));
        assert!(app.persistence().load().await.unwrap().windows.is_empty());
        assert_eq!(host.closed.lock().as_slice(), &[id, id]);
    }

    #[tokio::test]
    async fn failed_creation_leaves_no_entry() {
        let tempdir = TempDir::new().unwrap();
        let app = app(&tempdir).await;
        let host = Arc::new(RecordingHost {
            refuse: Some(WindowId::new(1)),
            ..Default::default()
        });
        let manager = WindowManager::new(&app, host);

        assert!(matches!(manager.open(None).await, Err(Error::Host { .. })));
        assert!(manager.store().window_ids().is_empty());
    }

    #[tokio::test]
    async fn restore_uses_saved_state_and_continues_ids() {
        let tempdir = TempDir::new().unwrap();
        let app = app(&tempdir).await;
        {
            let manager = WindowManager::new(&app, Arc::new(RecordingHost::default()));
            let id = manager.open_path(Path::new("/media/a.mp4")).await.unwrap();
            manager
                .store()
                .update_window(id, crate::state::WindowPatch::builder().volume(0.2).build())
                .unwrap();
            // defaults changed after the window was seeded
            manager
                .store()
                .update_settings(SettingsPatch::builder().default_volume(0.9).build());
            manager.save().await.unwrap();
        }

        let host = Arc::new(RecordingHost::default());
        let manager = WindowManager::new(&app, host.clone());
        let restored = manager.restore().await;
        assert_eq!(restored, vec![WindowId::new(1)]);

        let seed = host.created.lock()[&WindowId::new(1)].clone();
        assert_eq!(seed.volume, crate::state::Volume::new(0.2));
        assert_eq!(seed.status, crate::state::LoadStatus::Loading);

        let next = manager.open(None).await.unwrap();
        assert_eq!(next, WindowId::new(2));
    }

    #[tokio::test]
    async fn windows_the_host_cannot_restore_are_dropped() {
        let tempdir = TempDir::new().unwrap();
        let app = app(&tempdir).await;
        {
            let manager = WindowManager::new(&app, Arc::new(RecordingHost::default()));
            manager.open(None).await.unwrap();
            manager.open(None).await.unwrap();
            manager.save().await.unwrap();
        }

        let host = Arc::new(RecordingHost {
            refuse: Some(WindowId::new(1)),
            ..Default::default()
        });
        let manager = WindowManager::new(&app, host);
        assert_eq!(manager.restore().await, vec![WindowId::new(2)]);

        let persisted = app.persistence().load().await.unwrap();
        assert_eq!(persisted.windows.keys().copied().collect::<Vec<_>>(), vec![WindowId::new(2)]);
    }

    #[tokio::test]
    async fn shutdown_keeps_what_windows_saved() {
        let tempdir = TempDir::new().unwrap();
        let app = app(&tempdir).await;
        let manager = WindowManager::new(&app, Arc::new(RecordingHost::default()));
        manager.start_sync();
        let id = manager.open(None).await.unwrap();

        // the window persists a change the manager has not seen yet
        let replica = WindowStore::default();
        replica.replace(manager.store().snapshot(), ChangeSource::Remote);
        replica
            .update_window(id, WindowPatch::builder().zoom(3.0).build())
            .unwrap();
        app.persistence().save_window(id, &replica).await.unwrap();
        manager.shutdown().await.unwrap();

        let persisted = app.persistence().load().await.unwrap();
        assert_eq!(persisted.windows[&id].zoom, Zoom::new(3.0));
    }

    #[tokio::test]
    async fn windows_forgotten_elsewhere_stay_forgotten() {
        let tempdir = TempDir::new().unwrap();
        let app = app(&tempdir).await;
        let manager = WindowManager::new(&app, Arc::new(RecordingHost::default()));
        let kept = manager.open(None).await.unwrap();
        let dropped = manager.open(None).await.unwrap();

        assert!(app.persistence().remove_window(dropped).await.unwrap());
        manager.shutdown().await.unwrap();

        let persisted = app.persistence().load().await.unwrap();
        assert_eq!(persisted.windows.keys().copied().collect::<Vec<_>>(), vec![kept]);
    }
}
