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

use snafu::ResultExt;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use tokio::sync::{Mutex, broadcast};

use crate::{
    config::DatabaseConfig,
    err::*,
    kv::{KVStore, StorageChange},
    watch::{self, KnownValues, WatchGuard},
};

/// Database store that manages the SQLite connection pool
///
/// Clones share the pool, the change channel and the watch for writes from
/// other processes.
#[derive(Clone)]
pub struct DBStore {
    pool:    SqlitePool,
    changes: broadcast::Sender<StorageChange>,
    known:   KnownValues,
    watch:   Option<Arc<WatchGuard>>,
}

impl DBStore {
    /// Open the database described by `config`, creating the file and its
    /// parent directory if missing, and run the embedded migrations.
    #[tracing::instrument(level = "trace", skip_all, fields(db_path = %config.db_path.display()), err)]
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let db_path = &config.db_path;

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                path: parent.to_path_buf(),
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .journal_mode(SqliteJournalMode::Wal)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(config.idle_timeout)
            .connect_with(options.clone())
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        let (changes, _) = broadcast::channel(config.change_capacity);
        let known = Arc::new(Mutex::new(watch::read_all(&pool).await?));
        let watch = if config.watch_interval.is_zero() {
            None
        } else {
            let guard = watch::spawn(
                &options,
                Arc::clone(&known),
                changes.clone(),
                config.watch_interval,
            )
            .await?;
            Some(Arc::new(guard))
        };

        tracing::trace!("Initialized DBStore with path: {}", db_path.display());

        Ok(Self {
            pool,
            changes,
            known,
            watch,
        })
    }

    /// Get a KV store instance
    ///
    /// Every instance shares the change channel of this store.
    pub fn kv_store(&self) -> KVStore {
        KVStore::new(self.pool.clone(), self.changes.clone(), Arc::clone(&self.known))
    }

    /// Get the underlying SQLite pool
    pub const fn pool(&self) -> &SqlitePool { &self.pool }

    /// Stop watching for outside writes and close every pooled connection,
    /// waiting for in-flight writes.
    pub async fn close(&self) {
        if let Some(watch) = &self.watch {
            watch.stop();
        }
        self.pool.close().await;
    }
}
