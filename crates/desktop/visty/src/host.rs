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
    collections::BTreeMap,
    sync::{Arc, Weak},
};

use async_trait::async_trait;
use parking_lot::Mutex;
use visty_player::{
    AppState, ApplicationMenu, Result, WindowHost, WindowId, WindowIndex, WindowSession,
    WindowState, err::HostSnafu,
};

/// A window host without native windows: every window is a live
/// [`WindowSession`] running in this process.
pub(crate) struct HeadlessHost {
    this:     Weak<Self>,
    app:      AppState,
    sessions: Mutex<BTreeMap<WindowId, WindowSession>>,
    focused:  Mutex<Option<WindowId>>,
}

impl HeadlessHost {
    pub(crate) fn new(app: AppState) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            app,
            sessions: Mutex::new(BTreeMap::new()),
            focused: Mutex::new(None),
        })
    }

    pub(crate) fn window_ids(&self) -> Vec<WindowId> { self.sessions.lock().keys().copied().collect() }

    pub(crate) fn dispose_all(&self) {
        let sessions = std::mem::take(&mut *self.sessions.lock());
        for session in sessions.into_values() {
            session.dispose();
        }
    }
}

#[async_trait]
impl WindowHost for HeadlessHost {
    async fn create(&self, id: WindowId, seed: &WindowState) -> Result<()> {
        let Some(this) = self.this.upgrade() else {
            return HostSnafu { message: "host is shutting down" }.fail();
        };
        let host: Arc<dyn WindowHost> = this;
        let session =
            WindowSession::attach(&self.app, host, WindowIndex::new(id), Some(seed.clone()))
                .await?;
        self.sessions.lock().insert(id, session);
        *self.focused.lock() = Some(id);
        tracing::info!(%id, file = ?seed.file.as_ref().map(|f| &f.path), "window created");
        Ok(())
    }

    async fn close(&self, id: WindowId) {
        let session = self.sessions.lock().remove(&id);
        if let Some(session) = session {
            session.dispose();
        }
        let mut focused = self.focused.lock();
        if *focused == Some(id) {
            *focused = self.sessions.lock().keys().next_back().copied();
        }
    }

    async fn restore_all(&self) {
        tracing::debug!(windows = self.sessions.lock().len(), "restore window geometry");
    }

    async fn save_all(&self) {
        tracing::debug!(windows = self.sessions.lock().len(), "save window geometry");
    }

    fn focused(&self) -> Option<WindowId> { *self.focused.lock() }

    fn set_application_menu(&self, menu: &ApplicationMenu) {
        tracing::debug!(menu = ?menu, "application menu updated");
    }
}
