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
    cmp::Ordering,
    iter::Peekable,
    path::{Path, PathBuf},
    str::Chars,
};

use serde::{Deserialize, Serialize};
use snafu::OptionExt;
use unicode_normalization::UnicodeNormalization;
use url::Url;

use crate::err::{NotAFileSnafu, Result};

/// A media file referenced by a window.
///
/// Two values are equal when they point at the same path; `name` and `url`
/// are derived from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaFile {
    /// File name in NFC form, used for display and sorting.
    pub name: String,
    /// Absolute path on disk.
    pub path: PathBuf,
    /// `file://` URL handed to the media element.
    pub url:  String,
}

impl MediaFile {
    /// Builds a media file reference. Relative paths are resolved against the
    /// working directory; the file does not need to exist yet.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let path = std::path::absolute(path)
            .ok()
            .filter(|absolute| absolute.file_name().is_some())
            .context(NotAFileSnafu { path })?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().nfc().collect::<String>())
            .unwrap_or_default();
        let url = Url::from_file_path(&path)
            .map_or_else(|()| format!("file://{}", path.display()), String::from);

        Ok(Self { name, path, url })
    }

    pub fn mime_type(&self) -> Option<&'static str> { mime_type(&self.path) }
}

impl PartialEq for MediaFile {
    fn eq(&self, other: &Self) -> bool { self.path == other.path }
}

impl Eq for MediaFile {}

/// Orders files by display name the way a file browser would: ignoring
/// case, with digit runs compared by value (`track2` before `track10`).
/// Ties fall back to the exact name, then the path, so the order is total.
pub fn compare_names(a: &MediaFile, b: &MediaFile) -> Ordering {
    natural_cmp(&a.name.to_lowercase(), &b.name.to_lowercase())
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.path.cmp(&b.path))
}

fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (mut a, mut b) = (a.chars().peekable(), b.chars().peekable());
    loop {
        let ordering = match (a.peek().copied(), b.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                compare_numbers(&digit_run(&mut a), &digit_run(&mut b))
            }
            (Some(x), Some(y)) => {
                a.next();
                b.next();
                x.cmp(&y)
            }
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
}

fn digit_run(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(digit) = chars.next_if(char::is_ascii_digit) {
        run.push(digit);
    }
    run
}

/// Compares two digit strings by value; `07` sorts after `7`.
fn compare_numbers(a: &str, b: &str) -> Ordering {
    let (short_a, short_b) = (a.trim_start_matches('0'), b.trim_start_matches('0'));
    short_a
        .len()
        .cmp(&short_b.len())
        .then_with(|| short_a.cmp(short_b))
        .then_with(|| a.len().cmp(&b.len()))
}

const MIME_TYPES: &[(&str, &str)] = &[
    // audio
    ("aac", "audio/aac"),
    ("aif", "audio/aiff"),
    ("aiff", "audio/aiff"),
    ("flac", "audio/flac"),
    ("m4a", "audio/mp4"),
    ("mp3", "audio/mpeg"),
    ("oga", "audio/ogg"),
    ("ogg", "audio/ogg"),
    ("opus", "audio/opus"),
    ("wav", "audio/wav"),
    ("weba", "audio/webm"),
    // video
    ("3gp", "video/3gpp"),
    ("avi", "video/x-msvideo"),
    ("flv", "video/x-flv"),
    ("m4v", "video/x-m4v"),
    ("mkv", "video/x-matroska"),
    ("mov", "video/quicktime"),
    ("mp4", "video/mp4"),
    ("mpeg", "video/mpeg"),
    ("mpg", "video/mpeg"),
    ("ogv", "video/ogg"),
    ("ts", "video/mp2t"),
    ("webm", "video/webm"),
    ("wmv", "video/x-ms-wmv"),
    // known, but not playable
    ("gif", "image/gif"),
    ("jpeg", "image/jpeg"),
    ("jpg", "image/jpeg"),
    ("json", "application/json"),
    ("pdf", "application/pdf"),
    ("png", "image/png"),
    ("srt", "application/x-subrip"),
    ("txt", "text/plain"),
    ("vtt", "text/vtt"),
];

/// MIME type guessed from the file extension, `None` when unknown.
pub fn mime_type(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    MIME_TYPES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, mime)| *mime)
}

/// Whether the path looks like something the media element can play.
pub fn is_media(path: &Path) -> bool {
    mime_type(path).is_some_and(|mime| mime.starts_with("audio/") || mime.starts_with("video/"))
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("song.mp3", true ; "audio")]
    #[test_case("clip.MKV", true ; "uppercase extension")]
    #[test_case("notes.txt", false ; "text")]
    #[test_case("cover.png", false ; "image")]
    #[test_case("README", false ; "no extension")]
    #[test_case("archive.xyz", false ; "unknown extension")]
    fn media_detection(name: &str, expected: bool) {
        assert_eq!(is_media(Path::new(name)), expected);
    }

    #[test]
    fn name_is_nfc_normalized() {
        // "e" followed by a combining acute accent
        let file = MediaFile::from_path("/tmp/cafe\u{301}.mp3").unwrap();
        assert_eq!(file.name, "caf\u{e9}.mp3");
    }

    #[test]
    fn url_is_percent_encoded() {
        let file = MediaFile::from_path("/tmp/my video.mp4").unwrap();
        assert_eq!(file.url, "file:///tmp/my%20video.mp4");
        assert_eq!(file.mime_type(), Some("video/mp4"));
    }

    #[test]
    fn identity_is_the_path() {
        let a = MediaFile::from_path("/tmp/a.mp3").unwrap();
        let mut b = a.clone();
        b.name = "renamed".to_string();
        assert_eq!(a, b);
    }

    #[test]
    fn relative_paths_become_absolute() {
        let file = MediaFile::from_path("clip.mp4").unwrap();
        assert!(file.path.is_absolute());
    }

    #[test_case("track2.mp3", "track10.mp3" ; "numbers by value")]
    #[test_case("7.mp3", "07.mp3" ; "leading zeros after")]
    #[test_case("a.mp3", "a1.mp3" ; "prefix first")]
    #[test_case("disc1 track9.mp3", "disc2 track1.mp3" ; "first number decides")]
    #[test_case("Intro.mp3", "outro.mp3" ; "case ignored")]
    fn sorts_before(first: &str, second: &str) {
        let first = MediaFile::from_path(format!("/m/{first}")).unwrap();
        let second = MediaFile::from_path(format!("/m/{second}")).unwrap();
        assert_eq!(compare_names(&first, &second), Ordering::Less);
        assert_eq!(compare_names(&second, &first), Ordering::Greater);
    }

    #[test]
    fn sorting_ignores_case() {
        let upper = MediaFile::from_path("/m/B.mp3").unwrap();
        let lower = MediaFile::from_path("/m/a.mp3").unwrap();
        assert_eq!(compare_names(&lower, &upper), Ordering::Less);
    }
}
