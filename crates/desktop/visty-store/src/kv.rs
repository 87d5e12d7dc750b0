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

use std::collections::HashMap;

use serde::{Serialize, de::DeserializeOwned};
use snafu::ResultExt;
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{err::*, watch::KnownValues};

/// Notification emitted after a key was written or removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    pub key:       String,
    /// The JSON text now stored under `key`, `None` after a removal.
    pub new_value: Option<String>,
    /// Identity of the writer, when the writer identified itself. Lets a
    /// listener skip notifications caused by its own writes.
    pub origin:    Option<Uuid>,
}

/// Key-value store backed by SQLite
///
/// All values are serialized to JSON before storage. Writes made through
/// handles of one [`crate::DBStore`] are serialized with each other.
#[derive(Clone)]
pub struct KVStore {
    pool:    SqlitePool,
    changes: broadcast::Sender<StorageChange>,
    known:   KnownValues,
}

impl KVStore {
    /// Create a new KV store from a SQLite pool and the change channel
    pub(crate) const fn new(
        pool: SqlitePool,
        changes: broadcast::Sender<StorageChange>,
        known: KnownValues,
    ) -> Self {
        Self {
            pool,
            changes,
            known,
        }
    }

    /// Subscribe to every subsequent write made through any handle sharing
    /// this store's change channel, and to writes other processes made to
    /// the same database.
    pub fn subscribe(&self) -> broadcast::Receiver<StorageChange> { self.changes.subscribe() }

    /// Set a key-value pair
    ///
    /// The value will be serialized to JSON before storage
    pub async fn set<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<()> {
        let value_json = serde_json::to_string(value).context(CodecSnafu)?;
        let mut known = self.known.lock().await;
        self.write(&mut known, key, value_json, None).await
    }

    /// Set a key-value pair on behalf of `origin`.
    pub async fn set_from<T: Serialize + Sync>(
        &self,
        origin: Uuid,
        key: &str,
        value: &T,
    ) -> Result<()> {
        let value_json = serde_json::to_string(value).context(CodecSnafu)?;
        let mut known = self.known.lock().await;
        self.write(&mut known, key, value_json, Some(origin)).await
    }

    /// Reads `key`, lets `f` derive the new value and writes it on behalf of
    /// `origin`, with no other write of this process in between.
    ///
    /// A stored value that does not decode as `T` reaches `f` as `None`.
    /// Nothing is written when `f` returns `None`. Returns whether a value
    /// was written.
    pub async fn update<T, F>(&self, origin: Uuid, key: &str, f: F) -> Result<bool>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnOnce(Option<T>) -> Option<T> + Send,
    {
        let mut known = self.known.lock().await;
        let current = self.get_raw(key).await?.and_then(|raw| {
            serde_json::from_str(&raw)
                .inspect_err(|e| tracing::warn!(key, error = %e, "replacing undecodable value"))
                .ok()
        });
        let Some(value) = f(current) else {
            return Ok(false);
        };
        let value_json = serde_json::to_string(&value).context(CodecSnafu)?;
        self.write(&mut known, key, value_json, Some(origin)).await?;
        Ok(true)
    }

    async fn write(
        &self,
        known: &mut HashMap<String, String>,
        key: &str,
        value_json: String,
        origin: Option<Uuid>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO kv_table (key, value, updated_at) VALUES (?, ?, \
             strftime('%s', 'now'))",
        )
        .bind(key)
        .bind(value_json.as_str())
        .execute(&self.pool)
        .await?;

        tracing::trace!(key, bytes = value_json.len(), "kv write");
        known.insert(key.to_owned(), value_json.clone());

        // Nobody listening is fine.
        let _ = self.changes.send(StorageChange {
            key: key.to_owned(),
            new_value: Some(value_json),
            origin,
        });

        Ok(())
    }

    /// Get a value by key
    ///
    /// Returns `None` if the key does not exist
    /// The value will be deserialized from JSON
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_raw(key).await? {
            Some(value_json) => {
                let value = serde_json::from_str(&value_json).context(CodecSnafu)?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Get the stored JSON text of a key without decoding it.
    pub async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_table WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(value_json,)| value_json))
    }

    /// Remove a key-value pair
    pub async fn remove(&self, key: &str) -> Result<()> {
        let mut known = self.known.lock().await;
        sqlx::query("DELETE FROM kv_table WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        known.remove(key);

        let _ = self.changes.send(StorageChange {
            key:       key.to_owned(),
            new_value: None,
            origin:    None,
        });

        Ok(())
    }
}
