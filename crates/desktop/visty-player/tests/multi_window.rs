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

use std::{collections::BTreeMap, fs, path::Path, sync::Arc, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;
use visty_player::{
    AppConfig, AppState, ApplicationMenu, ChangeSource, Error, Event, LoadStatus, Result,
    SettingsPatch, WindowHost, WindowId, WindowIndex, WindowManager, WindowPatch, WindowSession,
    WindowState, WindowStore, Zoom, persistence::Section,
};

#[derive(Default)]
struct TestHost {
    seeds: Mutex<BTreeMap<WindowId, WindowState>>,
    menus: Mutex<Vec<ApplicationMenu>>,
}

#[async_trait]
impl WindowHost for TestHost {
    async fn create(&self, id: WindowId, seed: &WindowState) -> Result<()> {
        self.seeds.lock().insert(id, seed.clone());
        Ok(())
    }

    async fn close(&self, id: WindowId) { self.seeds.lock().remove(&id); }

    fn set_application_menu(&self, menu: &ApplicationMenu) { self.menus.lock().push(menu.clone()); }
}

async fn app(tempdir: &TempDir) -> AppState {
    visty_common_telemetry::logging::init_default_ut_logging();
    let config = AppConfig::default().with_database_path(tempdir.path().join("db").join("visty.db"));
    AppState::new(config).await.unwrap()
}

async fn attach(app: &AppState, host: &Arc<TestHost>, id: WindowId) -> WindowSession {
    let seed = host.seeds.lock().get(&id).cloned();
    WindowSession::attach(app, host.clone(), WindowIndex::new(id), seed)
        .await
        .unwrap()
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn default_settings_reach_every_window() {
    let tempdir = TempDir::new().unwrap();
    let app = app(&tempdir).await;
    let host = Arc::new(TestHost::default());
    let manager = WindowManager::new(&app, host.clone());

    let a = attach(&app, &host, manager.open(None).await.unwrap()).await;
    let b = attach(&app, &host, manager.open(None).await.unwrap()).await;
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let _watch = b.on_storage_change(move |snapshot| {
        let _ = tx.send(snapshot.settings.default_muted);
    });

    a.update_settings(SettingsPatch::builder().default_muted(true).build())
        .await;

    eventually(|| b.settings().default_muted).await;
    tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(muted) = rx.recv().await {
            if muted {
                break;
            }
        }
    })
    .await
    .expect("storage change handler never saw the new default");
    // a's own write did not come back as a remote change
    assert!(a.settings().default_muted);
}

#[tokio::test]
async fn new_windows_use_defaults_changed_in_another_window() {
    let tempdir = TempDir::new().unwrap();
    let app = app(&tempdir).await;
    let host = Arc::new(TestHost::default());
    let manager = WindowManager::new(&app, host.clone());
    manager.start_sync();

    let a = attach(&app, &host, manager.open(None).await.unwrap()).await;
    a.update_settings(SettingsPatch::builder().default_loop(true).build())
        .await;
    eventually(|| manager.store().get_settings().default_loop).await;

    let id = manager.open(None).await.unwrap();
    assert!(host.seeds.lock()[&id].loop_enabled);
}

#[tokio::test]
async fn events_only_reach_their_target() {
    let tempdir = TempDir::new().unwrap();
    let app = app(&tempdir).await;
    let host = Arc::new(TestHost::default());
    let manager = WindowManager::new(&app, host.clone());

    let a = attach(&app, &host, manager.open(None).await.unwrap()).await;
    let b = attach(&app, &host, manager.open(None).await.unwrap()).await;

    app.bus().publish_to(a.id(), Event::ToggleMute);
    eventually(|| a.window().is_ok_and(|window| window.muted)).await;
    assert!(!b.window().unwrap().muted);

    let path = tempdir.path().join("clip.mp4");
    manager.open_file(Some(b.id()), &path).await.unwrap();
    eventually(|| b.window().is_ok_and(|window| window.file.is_some())).await;
    assert_eq!(b.window().unwrap().status, LoadStatus::Loading);
    assert!(a.window().unwrap().file.is_none());
}

#[tokio::test]
async fn load_failure_stays_in_its_window() {
    let tempdir = TempDir::new().unwrap();
    let app = app(&tempdir).await;
    let host = Arc::new(TestHost::default());
    let manager = WindowManager::new(&app, host.clone());
    let path = tempdir.path().join("broken.mp4");

    let a = attach(&app, &host, manager.open_path(&path).await.unwrap()).await;
    let b = attach(&app, &host, manager.open_path(&path).await.unwrap()).await;

    a.mark_failed().await.unwrap();
    b.mark_loaded(30.0).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(a.window().unwrap().status, LoadStatus::Error);
    assert_eq!(b.window().unwrap().status, LoadStatus::Loaded);
}

#[tokio::test]
async fn inverted_loop_range_is_rejected() {
    let tempdir = TempDir::new().unwrap();
    let app = app(&tempdir).await;
    let host = Arc::new(TestHost::default());
    let manager = WindowManager::new(&app, host.clone());
    let a = attach(&app, &host, manager.open(None).await.unwrap()).await;

    let result = a.handle_event(Event::SetLoopRange { start: 10.0, end: 5.0 }).await;
    assert!(matches!(result, Err(Error::InvalidLoopRange { .. })));
    assert_eq!(a.window().unwrap().loop_range, None);

    a.handle_event(Event::SetLoopRange { start: 5.0, end: 10.0 }).await.unwrap();
    let range = a.window().unwrap().loop_range.unwrap();
    assert!((range.start() - 5.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn closed_windows_disappear_everywhere() {
    let tempdir = TempDir::new().unwrap();
    let app = app(&tempdir).await;
    let host = Arc::new(TestHost::default());
    let manager = WindowManager::new(&app, host.clone());

    let a = attach(&app, &host, manager.open(None).await.unwrap()).await;
    let b_id = manager.open(None).await.unwrap();
    let b = attach(&app, &host, b_id).await;
    eventually(|| a.store().contains(b_id)).await;

    b.dispose();
    manager.close(b_id).await;

    eventually(|| !a.store().contains(b_id)).await;
    assert!(matches!(manager.store().get_window(b_id), Err(Error::UnknownWindow { .. })));
    assert!(!host.seeds.lock().contains_key(&b_id));
}

#[tokio::test]
async fn track_navigation_follows_the_directory() {
    let tempdir = TempDir::new().unwrap();
    let media = tempdir.path().join("media");
    fs::create_dir(&media).unwrap();
    for name in ["a.mp3", "b.mp3", "c.mp3", "readme.txt"] {
        fs::write(media.join(name), b"").unwrap();
    }

    let app = app(&tempdir).await;
    let host = Arc::new(TestHost::default());
    let manager = WindowManager::new(&app, host.clone());
    let id = manager.open_path(&media.join("c.mp3")).await.unwrap();
    let session = attach(&app, &host, id).await;

    let next = session.next_track().await.unwrap().unwrap();
    assert_eq!(next.name, "a.mp3");
    let previous = session.previous_track().await.unwrap().unwrap();
    assert_eq!(previous.name, "c.mp3");

    let menu = session.update_application_menu().await.unwrap();
    assert!(menu.has_next && menu.has_previous);
    assert_eq!(host.menus.lock().last(), Some(&menu));

    let blank = session.playlist_file(Path::new("/no/such/dir/x.mp3")).await;
    assert!(blank.is_empty());
}

#[tokio::test]
async fn state_survives_a_restart() {
    let tempdir = TempDir::new().unwrap();
    let (first, second) = {
        let app = app(&tempdir).await;
        let host = Arc::new(TestHost::default());
        let manager = WindowManager::new(&app, host.clone());
        manager.start_sync();
        let first = manager.open_path(&tempdir.path().join("one.mp4")).await.unwrap();
        let second = manager.open(None).await.unwrap();
        let session = attach(&app, &host, first).await;
        session.handle_event(Event::ZoomIn).await.unwrap();
        eventually(|| manager.store().get_window(first).is_ok_and(|w| w.zoom.value() > 1.0)).await;
        manager.shutdown().await.unwrap();
        app.db().close().await;
        (first, second)
    };

    let app = app(&tempdir).await;
    let host = Arc::new(TestHost::default());
    let manager = WindowManager::new(&app, host.clone());
    assert_eq!(manager.restore().await, vec![first, second]);

    let session = attach(&app, &host, first).await;
    let window = session.window().unwrap();
    assert!((window.zoom.value() - 1.25).abs() < f64::EPSILON);
    assert_eq!(window.status, LoadStatus::Loading);
    assert!(manager.open(None).await.unwrap() > second);
}

#[tokio::test]
async fn settings_saved_by_another_process_reach_running_windows() {
    let tempdir = TempDir::new().unwrap();
    let running = app(&tempdir).await;
    let host = Arc::new(TestHost::default());
    let manager = WindowManager::new(&running, host.clone());
    manager.start_sync();
    let session = attach(&running, &host, manager.open(None).await.unwrap()).await;

    // a second process on the same database file, as `visty settings` runs
    let other = app(&tempdir).await;
    let store = WindowStore::default();
    store.replace(other.persistence().load().await.unwrap(), ChangeSource::Remote);
    store.update_settings(SettingsPatch::builder().default_muted(true).build());
    other
        .persistence()
        .save_section(Section::Settings, &store)
        .await
        .unwrap();

    eventually(|| session.settings().default_muted).await;
    eventually(|| manager.store().get_settings().default_muted).await;
    assert!(store.window_ids().contains(&session.id()));
}

#[tokio::test]
async fn windows_closed_by_another_process_stay_closed() {
    let tempdir = TempDir::new().unwrap();
    let running = app(&tempdir).await;
    let host = Arc::new(TestHost::default());
    let manager = WindowManager::new(&running, host.clone());
    manager.start_sync();
    let kept = manager.open(None).await.unwrap();
    let closed = manager.open(None).await.unwrap();

    let other = app(&tempdir).await;
    assert!(other.persistence().remove_window(closed).await.unwrap());

    eventually(|| !manager.store().contains(closed)).await;
    manager.shutdown().await.unwrap();

    let saved = running.persistence().load().await.unwrap();
    assert!(saved.windows.contains_key(&kept));
    assert!(!saved.windows.contains_key(&closed));
}

#[tokio::test]
async fn shutdown_right_after_a_window_change_keeps_it() {
    let tempdir = TempDir::new().unwrap();
    let app = app(&tempdir).await;
    let host = Arc::new(TestHost::default());
    let manager = WindowManager::new(&app, host.clone());
    let id = manager.open(None).await.unwrap();
    let session = attach(&app, &host, id).await;

    session
        .update_window(WindowPatch::builder().zoom(Zoom::new(3.0)).build())
        .await
        .unwrap();
    manager.shutdown().await.unwrap();

    let saved = app.persistence().load().await.unwrap();
    assert_eq!(saved.windows[&id].zoom, Zoom::new(3.0));
}
