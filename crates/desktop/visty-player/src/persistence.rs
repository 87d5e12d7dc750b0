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

//! Durable copy of the [`WindowStore`] under a single storage key.
//!
//! The slot holds `{"settings": "<json>", "window": "<json>"}`: each section
//! is encoded on its own so a section that no longer parses only resets
//! itself. Writers replace whole sections; the last writer of a section wins.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};
use uuid::Uuid;
use visty_store::{KVStore, StorageChange};

use crate::{
    err::{MalformedStateSnafu, Result},
    state::{
        ChangeSource, SettingsState, StoreChange, StoreEvent, StoreSnapshot, WindowId,
        WindowState, WindowStore,
    },
    util::ResultExt as _,
};

/// One of the two independently encoded parts of the persisted slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::AsRefStr, strum_macros::IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Section {
    Settings,
    Window,
}

/// The persisted slot as stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub settings: String,
    #[serde(default)]
    pub window:   String,
}

impl PersistedState {
    pub fn encode(snapshot: &StoreSnapshot) -> Result<Self> {
        Ok(Self {
            settings: encode_section(Section::Settings, &snapshot.settings)?,
            window:   encode_section(Section::Window, &snapshot.windows)?,
        })
    }

    /// The encoded text of one section.
    pub fn section(&self, section: Section) -> &str {
        match section {
            Section::Settings => &self.settings,
            Section::Window => &self.window,
        }
    }

    fn section_mut(&mut self, section: Section) -> &mut String {
        match section {
            Section::Settings => &mut self.settings,
            Section::Window => &mut self.window,
        }
    }

    pub fn decode_settings(&self) -> Result<SettingsState> {
        decode_section(Section::Settings, &self.settings)
    }

    pub fn decode_windows(&self) -> Result<BTreeMap<WindowId, WindowState>> {
        decode_section(Section::Window, &self.window)
    }

    /// Decodes both sections; a malformed or missing section falls back to
    /// its default and is logged.
    pub fn decode(&self) -> StoreSnapshot {
        StoreSnapshot {
            settings: self
                .decode_settings()
                .warn_err("discarding persisted settings")
                .unwrap_or_default(),
            windows:  self
                .decode_windows()
                .warn_err("discarding persisted windows")
                .unwrap_or_default(),
        }
    }
}

fn encode_section<T: Serialize>(section: Section, value: &T) -> Result<String> {
    serde_json::to_string(value).context(MalformedStateSnafu { section: <&'static str>::from(section) })
}

fn decode_section<T: for<'de> Deserialize<'de> + Default>(section: Section, raw: &str) -> Result<T> {
    if raw.is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(raw).context(MalformedStateSnafu { section: <&'static str>::from(section) })
}

/// Local edits of a [`WindowStore`] that are not persisted yet, gathered
/// from its change events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingChanges {
    settings: bool,
    windows:  BTreeSet<WindowId>,
    all:      bool,
}

impl PendingChanges {
    /// Records `event` if it is a local edit.
    pub fn record(&mut self, event: StoreEvent) {
        if !event.source.should_persist() {
            return;
        }
        match event.change {
            StoreChange::WindowCreated(id)
            | StoreChange::WindowUpdated(id)
            | StoreChange::WindowRemoved(id) => {
                self.windows.insert(id);
            }
            StoreChange::SettingsUpdated => self.settings = true,
            StoreChange::Replaced => self.all = true,
        }
    }

    /// Some events were missed, so everything counts as edited.
    pub const fn mark_all(&mut self) { self.all = true; }

    pub fn is_empty(&self) -> bool { !self.settings && !self.all && self.windows.is_empty() }
}

/// Reads and writes the persisted slot for one process or window.
///
/// Each instance has its own origin id, stamped on its writes, so that its
/// sync task can ignore the notifications it caused itself. Partial writes
/// read the slot and write it back with no other write of this process in
/// between.
#[derive(Clone)]
pub struct Persistence {
    kv:     KVStore,
    key:    Arc<str>,
    origin: Uuid,
}

impl Persistence {
    pub fn new(kv: KVStore, key: impl Into<Arc<str>>) -> Self {
        Self {
            kv,
            key: key.into(),
            origin: Uuid::new_v4(),
        }
    }

    pub const fn origin(&self) -> Uuid { self.origin }

    pub fn key(&self) -> &str { &self.key }

    /// Writes both sections of `store`.
    #[tracing::instrument(skip_all, fields(key = %self.key))]
    pub async fn save(&self, store: &WindowStore) -> Result<()> {
        let persisted = PersistedState::encode(&store.snapshot())?;
        self.kv.set_from(self.origin, &self.key, &persisted).await?;
        tracing::debug!("saved player state");
        Ok(())
    }

    /// Rewrites one section from `store`, keeping what is stored for the
    /// other one.
    #[tracing::instrument(skip_all, fields(key = %self.key, section = section.as_ref()))]
    pub async fn save_section(&self, section: Section, store: &WindowStore) -> Result<()> {
        let full = PersistedState::encode(&store.snapshot())?;
        self.kv
            .update(self.origin, &self.key, move |stored: Option<PersistedState>| {
                let Some(mut persisted) = stored else {
                    return Some(full);
                };
                *persisted.section_mut(section) = full.section(section).to_owned();
                Some(persisted)
            })
            .await?;
        Ok(())
    }

    /// Writes the local edits in `pending` into the stored slot: touched
    /// windows are rewritten or removed from `store`, and the settings are
    /// rewritten when they were touched. Everything else stays as stored.
    /// A missing slot is written whole from `store`.
    #[tracing::instrument(skip_all, fields(key = %self.key))]
    pub async fn save_changes(&self, store: &WindowStore, pending: &PendingChanges) -> Result<()> {
        let snapshot = store.snapshot();
        let full = PersistedState::encode(&snapshot)?;
        let pending = pending.clone();
        let written = self
            .kv
            .update(self.origin, &self.key, move |stored: Option<PersistedState>| {
                let Some(mut persisted) = stored.filter(|_| !pending.all) else {
                    return Some(full);
                };
                if pending.settings {
                    persisted.settings = full.settings;
                }
                if !pending.windows.is_empty() {
                    let mut windows = persisted
                        .decode_windows()
                        .warn_err("rewriting malformed window section")
                        .unwrap_or_else(|| snapshot.windows.clone());
                    for id in &pending.windows {
                        match snapshot.windows.get(id) {
                            Some(state) => windows.insert(*id, state.clone()),
                            None => windows.remove(id),
                        };
                    }
                    persisted.window = encode_section(Section::Window, &windows).log_err()?;
                }
                (!pending.is_empty()).then_some(persisted)
            })
            .await?;
        tracing::debug!(written, "saved local changes");
        Ok(())
    }

    /// Rewrites the stored entry of window `id` from `store`, leaving the
    /// entries of other windows as they are stored. Does nothing when the
    /// stored section no longer has the window, since it was closed.
    #[tracing::instrument(skip(self, store), fields(key = %self.key))]
    pub async fn save_window(&self, id: WindowId, store: &WindowStore) -> Result<()> {
        let state = store.get_window(id)?;
        let written = self
            .edit_windows(Some(store.snapshot()), move |windows| {
                windows.get_mut(&id).map(|entry| *entry = state).is_some()
            })
            .await?;
        if !written {
            tracing::debug!(%id, "window no longer persisted, skipping save");
        }
        Ok(())
    }

    /// Adds or rewrites the stored entry of window `id` from `store`.
    #[tracing::instrument(skip(self, store), fields(key = %self.key))]
    pub async fn insert_window(&self, id: WindowId, store: &WindowStore) -> Result<()> {
        let state = store.get_window(id)?;
        self.edit_windows(Some(store.snapshot()), move |windows| {
            windows.insert(id, state);
            true
        })
        .await?;
        Ok(())
    }

    /// Removes the stored entry of window `id`. Returns whether there was
    /// one.
    #[tracing::instrument(skip(self), fields(key = %self.key))]
    pub async fn remove_window(&self, id: WindowId) -> Result<bool> {
        self.edit_windows(None, move |windows| windows.remove(&id).is_some())
            .await
    }

    /// Applies `edit` to the stored window section and writes it back when
    /// `edit` returns true. A missing slot starts from `fallback`, or is left
    /// alone without one; a malformed section starts from the windows of
    /// `fallback`.
    async fn edit_windows<F>(&self, fallback: Option<StoreSnapshot>, edit: F) -> Result<bool>
    where
        F: FnOnce(&mut BTreeMap<WindowId, WindowState>) -> bool + Send,
    {
        let written = self
            .kv
            .update(self.origin, &self.key, move |stored: Option<PersistedState>| {
                let mut persisted = match stored {
                    Some(persisted) => persisted,
                    None => PersistedState::encode(fallback.as_ref()?).log_err()?,
                };
                let mut windows = persisted
                    .decode_windows()
                    .warn_err("rewriting malformed window section")
                    .unwrap_or_else(|| {
                        fallback.map(|snapshot| snapshot.windows).unwrap_or_default()
                    });
                if !edit(&mut windows) {
                    return None;
                }
                persisted.window = encode_section(Section::Window, &windows).log_err()?;
                Some(persisted)
            })
            .await?;
        Ok(written)
    }

    async fn read(&self) -> Result<Option<PersistedState>> {
        Ok(self.kv.get::<PersistedState>(&self.key).await?)
    }

    /// Loads the persisted snapshot. Absent, unreadable or malformed data
    /// yields `None`; callers fall back to defaults.
    #[tracing::instrument(skip_all, fields(key = %self.key))]
    pub async fn load(&self) -> Option<StoreSnapshot> {
        let persisted = self.read().await.warn_err("persisted state unavailable")??;
        Some(persisted.decode())
    }

    /// Decodes a storage notification written by someone else under our key.
    pub fn remote_snapshot(&self, change: &StorageChange) -> Option<StoreSnapshot> {
        if change.key != *self.key || change.origin == Some(self.origin) {
            return None;
        }
        let raw = change.new_value.as_deref()?;
        let persisted: PersistedState = serde_json::from_str(raw)
            .warn_err("ignoring malformed storage notification")?;
        Some(persisted.decode())
    }

    /// Applies every remote write of the slot to `store` as a
    /// [`ChangeSource::Remote`] replacement, which is never written back.
    /// Ends when the storage channel closes.
    pub fn spawn_sync(&self, store: WindowStore) -> JoinHandle<()> {
        self.spawn_sync_with(self.subscribe(), store, None)
    }

    /// Storage notifications, for callers that need to subscribe before
    /// their initial [`Persistence::load`].
    pub fn subscribe(&self) -> broadcast::Receiver<StorageChange> { self.kv.subscribe() }

    /// Like [`Persistence::spawn_sync`], consuming an earlier subscription.
    /// The sampled playback values of `owned` are kept as they are in
    /// `store`.
    pub fn spawn_sync_with(
        &self,
        mut changes: broadcast::Receiver<StorageChange>,
        store: WindowStore,
        owned: Option<WindowId>,
    ) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) => {
                        if let Some(snapshot) = this.remote_snapshot(&change) {
                            store.replace_owned(snapshot, ChangeSource::Remote, owned);
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "storage notifications lagged, reloading");
                        if let Some(snapshot) = this.load().await {
                            store.replace_owned(snapshot, ChangeSource::Remote, owned);
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
                if store.is_disposed() {
                    break;
                }
            }
        })
    }
}
