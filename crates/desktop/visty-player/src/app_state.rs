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

use std::sync::Arc;

use visty_store::DBStore;

use crate::{bus::MessageBus, config::AppConfig, err::Result, persistence::Persistence};

/// Process-wide handles shared by the window manager and every window
/// session: configuration, the database and the message bus.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: AppConfig,
    db:     DBStore,
    bus:    MessageBus,
}

impl AppState {
    /// Opens the database and creates the bus.
    ///
    /// # Errors
    /// Returns an error if database initialization fails
    pub async fn new(config: AppConfig) -> Result<Self> {
        let db = DBStore::new(&config.database).await?;
        let bus = MessageBus::new(config.app.bus_capacity);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                db,
                bus,
            }),
        })
    }

    pub fn config(&self) -> &AppConfig { &self.inner.config }

    pub fn db(&self) -> DBStore { self.inner.db.clone() }

    pub fn bus(&self) -> MessageBus { self.inner.bus.clone() }

    /// A persistence handle with its own writer identity.
    pub fn persistence(&self) -> Persistence {
        Persistence::new(self.inner.db.kv_store(), self.inner.config.app.storage_key.as_str())
    }
}
