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

//! Notices writes made to the database file by other processes.
//!
//! `PRAGMA data_version` on a dedicated connection changes whenever another
//! connection commits. When it moves, the table is compared with the values
//! this process last wrote or saw, and every difference is announced with no
//! origin.

use std::{collections::HashMap, sync::Arc, time::Duration};

use sqlx::{Connection, SqliteConnection, SqlitePool, sqlite::SqliteConnectOptions};
use tokio::{
    sync::{Mutex, broadcast},
    task::JoinHandle,
    time::MissedTickBehavior,
};

use crate::{err::*, kv::StorageChange};

/// The value of every key as this process knows it.
///
/// In-process writers hold the lock around their statement and record what
/// they wrote, so the watcher only reports values written elsewhere.
pub(crate) type KnownValues = Arc<Mutex<HashMap<String, String>>>;

pub(crate) async fn read_all(pool: &SqlitePool) -> Result<HashMap<String, String>> {
    let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM kv_table")
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().collect())
}

/// Aborts the watch task once the last [`crate::DBStore`] clone is gone.
pub(crate) struct WatchGuard(JoinHandle<()>);

impl WatchGuard {
    pub(crate) fn stop(&self) { self.0.abort(); }
}

impl Drop for WatchGuard {
    fn drop(&mut self) { self.0.abort(); }
}

pub(crate) async fn spawn(
    options: &SqliteConnectOptions,
    known: KnownValues,
    changes: broadcast::Sender<StorageChange>,
    period: Duration,
) -> Result<WatchGuard> {
    let mut conn = SqliteConnection::connect_with(options).await?;
    let mut version = data_version(&mut conn).await?;

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(e) = poll(&mut conn, &known, &changes, &mut version).await {
                tracing::warn!(error = %e, "checking for outside writes failed");
            }
        }
    });
    Ok(WatchGuard(task))
}

async fn data_version(conn: &mut SqliteConnection) -> Result<i64> {
    Ok(sqlx::query_scalar::<_, i64>("PRAGMA data_version")
        .fetch_one(&mut *conn)
        .await?)
}

async fn poll(
    conn: &mut SqliteConnection,
    known: &KnownValues,
    changes: &broadcast::Sender<StorageChange>,
    version: &mut i64,
) -> Result<()> {
    let current = data_version(conn).await?;
    if current == *version {
        return Ok(());
    }
    *version = current;

    let mut known = known.lock().await;
    let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM kv_table")
        .fetch_all(&mut *conn)
        .await?;
    let stored: HashMap<String, String> = rows.into_iter().collect();

    for (key, value) in &stored {
        if known.get(key) != Some(value) {
            tracing::debug!(key, "outside write");
            let _ = changes.send(StorageChange {
                key:       key.clone(),
                new_value: Some(value.clone()),
                origin:    None,
            });
        }
    }
    for key in known.keys().filter(|key| !stored.contains_key(*key)) {
        tracing::debug!(key, "outside removal");
        let _ = changes.send(StorageChange {
            key:       key.clone(),
            new_value: None,
            origin:    None,
        });
    }
    *known = stored;
    Ok(())
}
