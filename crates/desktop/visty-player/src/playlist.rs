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

//! Previous/next navigation over the media files of a directory.

use std::path::Path;

use serde::Serialize;
use snafu::ResultExt;

use crate::{
    err::{ReadDirSnafu, Result},
    media::{self, MediaFile},
    util::ResultExt as _,
};

/// The neighbours of a file in its directory. Derived, never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlaylistFile {
    pub previous: Option<MediaFile>,
    pub next:     Option<MediaFile>,
}

impl PlaylistFile {
    pub const fn is_empty(&self) -> bool { self.previous.is_none() && self.next.is_none() }
}

/// Lists the media siblings of `path`, sorted by display name, and returns
/// the entries around it with wrap-around.
///
/// Nothing is cached: every call reads the directory again.
#[tracing::instrument(level = "debug")]
pub async fn resolve_playlist(path: &Path) -> Result<PlaylistFile> {
    let current = MediaFile::from_path(path)?;
    let Some(dir) = current.path.parent() else {
        return Ok(PlaylistFile::default());
    };

    let mut entries = tokio::fs::read_dir(dir).await.context(ReadDirSnafu { path: dir })?;
    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .context(ReadDirSnafu { path: dir })?
    {
        let entry_path = entry.path();
        if !media::is_media(&entry_path) {
            continue;
        }
        // follows symlinks; entries that vanished meanwhile are skipped
        match tokio::fs::metadata(&entry_path).await {
            Ok(metadata) if metadata.is_file() => {}
            _ => continue,
        }
        files.push(MediaFile::from_path(&entry_path)?);
    }
    files.sort_by(media::compare_names);

    Ok(adjacent(&files, &current))
}

/// Same as [`resolve_playlist`], with IO failures logged and turned into an
/// empty playlist.
pub async fn resolve_playlist_or_empty(path: &Path) -> PlaylistFile {
    resolve_playlist(path)
        .await
        .warn_err("playlist unavailable")
        .unwrap_or_default()
}

/// Neighbours of `current` in an already sorted list.
pub fn adjacent(files: &[MediaFile], current: &MediaFile) -> PlaylistFile {
    let len = files.len();
    if len <= 1 {
        return PlaylistFile::default();
    }
    let Some(index) = files.iter().position(|file| file == current) else {
        return PlaylistFile::default();
    };

    PlaylistFile {
        previous: Some(files[(index + len - 1) % len].clone()),
        next:     Some(files[(index + 1) % len].clone()),
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, path::PathBuf};

    use tempfile::TempDir;
    use test_case::test_case;

    use super::*;

    fn populate(names: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for name in names {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        dir
    }

    fn name(file: Option<MediaFile>) -> Option<String> { file.map(|file| file.name) }

    #[test_case("a.mp3", "c.mp4", "b.mkv" ; "first wraps to last")]
    #[test_case("b.mkv", "a.mp3", "c.mp4" ; "middle")]
    #[test_case("c.mp4", "b.mkv", "a.mp3" ; "last wraps to first")]
    #[tokio::test]
    async fn neighbours_wrap_around(current: &str, previous: &str, next: &str) {
        let dir = populate(&["c.mp4", "a.mp3", "b.mkv"]);
        let playlist = resolve_playlist(&dir.path().join(current)).await.unwrap();
        assert_eq!(name(playlist.previous).as_deref(), Some(previous));
        assert_eq!(name(playlist.next).as_deref(), Some(next));
    }

    #[tokio::test]
    async fn non_media_files_are_skipped() {
        let dir = populate(&["a.mp3", "b.txt", "c.mp3", "b.png"]);
        let playlist = resolve_playlist(&dir.path().join("a.mp3")).await.unwrap();
        assert_eq!(name(playlist.next).as_deref(), Some("c.mp3"));
        assert_eq!(name(playlist.previous).as_deref(), Some("c.mp3"));
    }

    #[tokio::test]
    async fn single_media_file_has_no_neighbours() {
        let dir = populate(&["only.mp4", "notes.txt"]);
        let playlist = resolve_playlist(&dir.path().join("only.mp4")).await.unwrap();
        assert!(playlist.is_empty());
    }

    #[tokio::test]
    async fn unknown_file_has_no_neighbours() {
        let dir = populate(&["a.mp3", "b.mp3"]);
        let playlist = resolve_playlist(&dir.path().join("gone.mp3")).await.unwrap();
        assert!(playlist.is_empty());
    }

    #[tokio::test]
    async fn directories_named_like_media_are_skipped() {
        let dir = populate(&["a.mp3", "b.mp3"]);
        fs::create_dir(dir.path().join("a2.mp4")).unwrap();
        let playlist = resolve_playlist(&dir.path().join("a.mp3")).await.unwrap();
        assert_eq!(name(playlist.next).as_deref(), Some("b.mp3"));
    }

    #[tokio::test]
    async fn missing_directory_is_an_error_or_empty() {
        let path = PathBuf::from("/definitely/not/here/a.mp3");
        assert!(resolve_playlist(&path).await.is_err());
        assert!(resolve_playlist_or_empty(&path).await.is_empty());
    }

    #[test]
    fn adjacency_over_n_files() {
        let files: Vec<_> = (0..5)
            .map(|i| MediaFile::from_path(format!("/m/{i}.mp3")).unwrap())
            .collect();
        for (i, file) in files.iter().enumerate() {
            let playlist = adjacent(&files, file);
            assert_eq!(playlist.previous.as_ref(), Some(&files[(i + 4) % 5]));
            assert_eq!(playlist.next.as_ref(), Some(&files[(i + 1) % 5]));
        }
    }
}
