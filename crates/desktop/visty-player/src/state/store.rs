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

use std::{collections::BTreeMap, sync::Arc};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use snafu::OptionExt;
use tokio::sync::broadcast;

use super::{
    settings::{SettingsPatch, SettingsState},
    window::{WindowId, WindowPatch, WindowState},
};
use crate::err::{DuplicateWindowSnafu, Result, UnknownWindowSnafu};

const DEFAULT_CHANGE_CAPACITY: usize = 128;

/// Everything the store holds, as one value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub settings: SettingsState,
    pub windows:  BTreeMap<WindowId, WindowState>,
}

/// Who caused a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum ChangeSource {
    /// A user action in this process. Persisted.
    Local,
    /// Applied from a storage notification written elsewhere. Never written back.
    Remote,
    /// Mirrored from the media element by the sampler. Not persisted on its own.
    Sampled,
}

impl ChangeSource {
    pub const fn should_persist(self) -> bool { matches!(self, Self::Local) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreChange {
    WindowCreated(WindowId),
    WindowUpdated(WindowId),
    WindowRemoved(WindowId),
    SettingsUpdated,
    /// Both sections were replaced wholesale.
    Replaced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreEvent {
    pub change: StoreChange,
    pub source: ChangeSource,
}

/// Window states keyed by id plus the shared settings.
///
/// Mutations are synchronous and atomic: readers never observe a partially
/// merged patch. Every mutation is announced to subscribers after the lock is
/// released. Cloning yields another handle to the same store.
#[derive(Clone)]
pub struct WindowStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    state:   RwLock<StoreSnapshot>,
    changes: RwLock<Option<broadcast::Sender<StoreEvent>>>,
}

impl Default for WindowStore {
    fn default() -> Self { Self::init(DEFAULT_CHANGE_CAPACITY) }
}

impl WindowStore {
    /// Creates an empty store whose change channel buffers `capacity` events
    /// per subscriber.
    pub fn init(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(StoreInner {
                state:   RwLock::new(StoreSnapshot::default()),
                changes: RwLock::new(Some(sender)),
            }),
        }
    }

    /// Drops all state and closes the change channel, which ends every
    /// subscriber loop. Later mutations still work but are not announced.
    pub fn dispose(&self) {
        *self.inner.state.write() = StoreSnapshot::default();
        self.inner.changes.write().take();
    }

    pub fn is_disposed(&self) -> bool { self.inner.changes.read().is_none() }

    /// Subscribes to changes. A disposed store yields a closed receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.changes.read().as_ref().map_or_else(
            || broadcast::channel(1).1,
            broadcast::Sender::subscribe,
        )
    }

    fn notify(&self, change: StoreChange, source: ChangeSource) {
        if let Some(sender) = self.inner.changes.read().as_ref() {
            // no subscribers is fine
            let _ = sender.send(StoreEvent { change, source });
        }
    }

    pub fn create_window(&self, id: WindowId, seed: WindowState) -> Result<()> {
        {
            let mut state = self.inner.state.write();
            if state.windows.contains_key(&id) {
                return DuplicateWindowSnafu { id }.fail();
            }
            state.windows.insert(id, seed);
        }
        self.notify(StoreChange::WindowCreated(id), ChangeSource::Local);
        Ok(())
    }

    /// Merges `patch` into the window's state and returns the new state.
    pub fn update_window(&self, id: WindowId, patch: WindowPatch) -> Result<WindowState> {
        self.update_window_from(id, patch, ChangeSource::Local)
    }

    pub fn update_window_from(
        &self,
        id: WindowId,
        patch: WindowPatch,
        source: ChangeSource,
    ) -> Result<WindowState> {
        let updated = {
            let mut state = self.inner.state.write();
            let window = state.windows.get_mut(&id).context(UnknownWindowSnafu { id })?;
            window.apply(patch)?;
            window.clone()
        };
        self.notify(StoreChange::WindowUpdated(id), source);
        Ok(updated)
    }

    /// Removes the window. Returns whether an entry existed.
    pub fn remove_window(&self, id: WindowId) -> bool {
        let removed = self.inner.state.write().windows.remove(&id).is_some();
        if removed {
            self.notify(StoreChange::WindowRemoved(id), ChangeSource::Local);
        }
        removed
    }

    pub fn update_settings(&self, patch: SettingsPatch) -> SettingsState {
        let updated = {
            let mut state = self.inner.state.write();
            state.settings.apply(patch);
            state.settings.clone()
        };
        self.notify(StoreChange::SettingsUpdated, ChangeSource::Local);
        updated
    }

    pub fn get_window(&self, id: WindowId) -> Result<WindowState> {
        self.inner
            .state
            .read()
            .windows
            .get(&id)
            .cloned()
            .context(UnknownWindowSnafu { id })
    }

    pub fn contains(&self, id: WindowId) -> bool { self.inner.state.read().windows.contains_key(&id) }

    pub fn window_ids(&self) -> Vec<WindowId> {
        self.inner.state.read().windows.keys().copied().collect()
    }

    pub fn get_settings(&self) -> SettingsState { self.inner.state.read().settings.clone() }

    pub fn snapshot(&self) -> StoreSnapshot { self.inner.state.read().clone() }

    /// Replaces both sections. Live flags of windows that survive the
    /// replacement are carried over, since they never travel through storage.
    pub fn replace(&self, snapshot: StoreSnapshot, source: ChangeSource) {
        self.replace_owned(snapshot, source, None);
    }

    /// Like [`WindowStore::replace`], also keeping the playback position,
    /// volume and mute state of `owned`. Those are mirrored from the media
    /// element of that window and are newer here than in any snapshot.
    pub fn replace_owned(
        &self,
        snapshot: StoreSnapshot,
        source: ChangeSource,
        owned: Option<WindowId>,
    ) {
        {
            let mut state = self.inner.state.write();
            let StoreSnapshot { settings, mut windows } = snapshot;
            for (id, incoming) in &mut windows {
                let Some(current) = state.windows.get(id) else {
                    continue;
                };
                incoming.duration = current.duration;
                incoming.fullscreen = current.fullscreen;
                incoming.picture_in_picture = current.picture_in_picture;
                if incoming.file == current.file {
                    incoming.status = current.status;
                    if owned == Some(*id) {
                        incoming.current_time = current.current_time;
                        incoming.volume = current.volume;
                        incoming.muted = current.muted;
                    }
                }
            }
            *state = StoreSnapshot { settings, windows };
        }
        self.notify(StoreChange::Replaced, source);
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::{
        err::Error,
        state::{Volume, Zoom},
    };

    #[test]
    fn duplicate_windows_are_rejected() {
        let store = WindowStore::default();
        let id = WindowId::new(1);
        store.create_window(id, WindowState::default()).unwrap();
        let err = store.create_window(id, WindowState::default()).unwrap_err();
        assert!(matches!(err, Error::DuplicateWindow { .. }));
        assert_eq!(store.window_ids(), vec![id]);
    }

    #[test]
    fn closed_windows_are_gone() {
        let store = WindowStore::default();
        let id = WindowId::new(7);
        store.create_window(id, WindowState::default()).unwrap();
        assert!(store.remove_window(id));
        assert!(!store.remove_window(id));

        assert!(matches!(store.get_window(id), Err(Error::UnknownWindow { .. })));
        let patch = WindowPatch::builder().muted(true).build();
        assert!(matches!(store.update_window(id, patch), Err(Error::UnknownWindow { .. })));
    }

    #[test]
    fn settings_merge_is_field_wise() {
        let store = WindowStore::default();
        store.update_settings(SettingsPatch::builder().default_loop(true).build());
        store.update_settings(SettingsPatch::builder().default_volume(0.4).build());

        let settings = store.get_settings();
        assert!(settings.default_loop);
        assert_eq!(settings.default_volume, Volume::new(0.4));
    }

    #[test]
    fn concurrent_updates_to_different_windows() {
        let store = WindowStore::default();
        let ids: Vec<_> = (0..8).map(WindowId::new).collect();
        for id in &ids {
            store.create_window(*id, WindowState::default()).unwrap();
        }

        let handles: Vec<_> = ids
            .iter()
            .map(|&id| {
                let store = store.clone();
                thread::spawn(move || {
                    for step in 0..200 {
                        #[allow(clippy::cast_precision_loss)]
                        let time = (id.get() * 1000 + step) as f64;
                        let patch = WindowPatch::builder().current_time(time).build();
                        store.update_window(id, patch).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for id in ids {
            #[allow(clippy::cast_precision_loss)]
            let expected = (id.get() * 1000 + 199) as f64;
            let window = store.get_window(id).unwrap();
            assert!((window.current_time - expected).abs() < f64::EPSILON);
        }
    }

    #[tokio::test]
    async fn changes_carry_their_source() {
        let store = WindowStore::default();
        let mut changes = store.subscribe();
        let id = WindowId::new(3);

        store.create_window(id, WindowState::default()).unwrap();
        store.replace(StoreSnapshot::default(), ChangeSource::Remote);

        let created = changes.recv().await.unwrap();
        assert_eq!(created.change, StoreChange::WindowCreated(id));
        assert!(created.source.should_persist());

        let replaced = changes.recv().await.unwrap();
        assert_eq!(replaced.change, StoreChange::Replaced);
        assert!(!replaced.source.should_persist());
    }

    #[tokio::test]
    async fn dispose_ends_subscriptions() {
        let store = WindowStore::default();
        let mut changes = store.subscribe();
        store.create_window(WindowId::new(1), WindowState::default()).unwrap();
        store.dispose();

        assert!(changes.recv().await.is_ok());
        assert!(changes.recv().await.is_err());
        assert!(store.window_ids().is_empty());
        assert!(store.subscribe().recv().await.is_err());
    }

    #[test]
    fn replace_keeps_live_flags() {
        let store = WindowStore::default();
        let id = WindowId::new(1);
        store.create_window(id, WindowState::default()).unwrap();
        store
            .update_window(id, WindowPatch::builder().fullscreen(true).duration(8.0).build())
            .unwrap();

        let mut incoming = store.snapshot();
        incoming.windows.get_mut(&id).unwrap().muted = true;
        incoming.windows.get_mut(&id).unwrap().fullscreen = false;
        store.replace(incoming, ChangeSource::Remote);

        let window = store.get_window(id).unwrap();
        assert!(window.muted);
        assert!(window.fullscreen);
        assert_eq!(window.duration, Some(8.0));
    }

    #[test]
    fn owned_window_keeps_its_sampled_values() {
        let store = WindowStore::default();
        let own = WindowId::new(1);
        let other = WindowId::new(2);
        for id in [own, other] {
            store.create_window(id, WindowState::default()).unwrap();
            store
                .update_window_from(
                    id,
                    WindowPatch::builder().current_time(42.0).muted(true).build(),
                    ChangeSource::Sampled,
                )
                .unwrap();
        }

        let mut stale = store.snapshot();
        for window in stale.windows.values_mut() {
            window.current_time = 5.0;
            window.muted = false;
            window.zoom = Zoom::new(2.0);
        }
        store.replace_owned(stale, ChangeSource::Remote, Some(own));

        let own = store.get_window(own).unwrap();
        assert!((own.current_time - 42.0).abs() < f64::EPSILON);
        assert!(own.muted);
        assert_eq!(own.zoom, Zoom::new(2.0));

        let other = store.get_window(other).unwrap();
        assert!((other.current_time - 5.0).abs() < f64::EPSILON);
        assert!(!other.muted);
    }
}
