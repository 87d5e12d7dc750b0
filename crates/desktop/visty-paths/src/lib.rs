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
    path::{Path, PathBuf},
    sync::OnceLock,
};

/// Environment variable that relocates every visty directory, used for
/// portable installs and isolated test runs.
pub const DATA_DIR_ENV_VAR: &str = "VISTY_DATA_DIR";

static HOME_DIR: OnceLock<PathBuf> = OnceLock::new();

/// A custom data directory override, set only by `set_custom_data_dir`.
static CUSTOM_DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

/// The resolved data directory, combining custom override or platform defaults.
/// On macOS, this is `~/Library/Application Support/Visty`.
/// On Linux/FreeBSD, this is `$XDG_DATA_HOME/visty`.
static CURRENT_DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

/// The resolved config directory.
/// On Linux/FreeBSD, this is `$XDG_CONFIG_HOME/visty`.
static CONFIG_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the path to the user's home directory.
pub fn home_dir() -> &'static PathBuf {
    HOME_DIR.get_or_init(|| dirs::home_dir().expect("failed to determine home directory"))
}

fn custom_data_dir() -> Option<&'static PathBuf> {
    if CUSTOM_DATA_DIR.get().is_none() {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV_VAR) {
            if !dir.is_empty() {
                return Some(set_custom_data_dir(&dir));
            }
        }
    }
    CUSTOM_DATA_DIR.get()
}

/// Returns the path to the configuration directory used by Visty.
pub fn config_dir() -> &'static PathBuf {
    CONFIG_DIR.get_or_init(|| {
        if let Some(custom_dir) = custom_data_dir() {
            custom_dir.join("config")
        } else if cfg!(target_os = "windows") {
            dirs::config_dir()
                .expect("failed to determine RoamingAppData directory")
                .join("Visty")
        } else if cfg!(any(target_os = "linux", target_os = "freebsd")) {
            if let Ok(flatpak_xdg_config) = std::env::var("FLATPAK_XDG_CONFIG_HOME") {
                flatpak_xdg_config.into()
            } else {
                dirs::config_dir().expect("failed to determine XDG_CONFIG_HOME directory")
            }
            .join("visty")
        } else {
            home_dir().join(".config").join("visty")
        }
    })
}

/// Returns the path to the data directory used by Visty.
pub fn data_dir() -> &'static PathBuf {
    CURRENT_DATA_DIR.get_or_init(|| {
        if let Some(custom_dir) = custom_data_dir() {
            custom_dir.clone()
        } else if cfg!(any(target_os = "linux", target_os = "freebsd")) {
            if let Ok(flatpak_xdg_data) = std::env::var("FLATPAK_XDG_DATA_HOME") {
                flatpak_xdg_data.into()
            } else {
                dirs::data_local_dir().expect("failed to determine XDG_DATA_HOME directory")
            }
            .join("visty")
        } else {
            dirs::data_local_dir()
                .expect("failed to determine LocalAppData directory")
                .join("Visty")
        }
    })
}

/// Sets a custom directory for all user data, overriding the default data
/// directory. Must be called before any other path operation that depends on
/// the data directory. Relative paths are canonicalized and the directory is
/// created if it doesn't exist.
///
/// # Panics
///
/// Panics if:
/// * Called after the data directory has been initialized (e.g., via `data_dir`
///   or `config_dir`)
/// * The directory cannot be created
pub fn set_custom_data_dir<P: ?Sized + AsRef<Path>>(dir: &P) -> &'static PathBuf {
    if CURRENT_DATA_DIR.get().is_some() || CONFIG_DIR.get().is_some() {
        panic!("set_custom_data_dir called after data_dir or config_dir was initialized");
    }
    CUSTOM_DATA_DIR.get_or_init(|| {
        let mut path = dir.as_ref().to_path_buf();
        if path.is_relative() {
            if let Ok(abs) = path.canonicalize() {
                path = abs;
            }
        }

        std::fs::create_dir_all(&path).unwrap_or_else(|e| {
            panic!(
                "failed to create custom data directory {}: {e}",
                path.display()
            )
        });

        path
    })
}

/// Returns the path to the temp directory used by Visty.
pub fn temp_dir() -> &'static PathBuf {
    static TEMP_DIR: OnceLock<PathBuf> = OnceLock::new();
    TEMP_DIR.get_or_init(|| {
        if let Some(custom_dir) = custom_data_dir() {
            return custom_dir.join("tmp");
        }

        if cfg!(any(target_os = "linux", target_os = "freebsd")) {
            return if let Ok(flatpak_xdg_cache) = std::env::var("FLATPAK_XDG_CACHE_HOME") {
                flatpak_xdg_cache.into()
            } else {
                dirs::cache_dir().expect("failed to determine XDG_CACHE_HOME directory")
            }
            .join("visty");
        }

        dirs::cache_dir()
            .map_or_else(|| home_dir().join(".cache"), |dir| dir)
            .join("Visty")
    })
}

/// Returns the path to the logs directory.
pub fn logs_dir() -> &'static PathBuf {
    static LOGS_DIR: OnceLock<PathBuf> = OnceLock::new();
    LOGS_DIR.get_or_init(|| {
        if cfg!(target_os = "macos") && custom_data_dir().is_none() {
            home_dir().join("Library/Logs/Visty")
        } else {
            data_dir().join("logs")
        }
    })
}

/// Returns the path to the database directory.
pub fn database_dir() -> &'static PathBuf {
    static DATABASE_DIR: OnceLock<PathBuf> = OnceLock::new();
    DATABASE_DIR.get_or_init(|| data_dir().join("db"))
}

/// Returns the path to the `visty.db` file holding persisted player state.
pub fn database_file() -> &'static PathBuf {
    static DATABASE_FILE: OnceLock<PathBuf> = OnceLock::new();
    DATABASE_FILE.get_or_init(|| database_dir().join("visty.db"))
}

/// Returns the path to the optional `config.json` file.
pub fn config_file() -> &'static PathBuf {
    static CONFIG_FILE: OnceLock<PathBuf> = OnceLock::new();
    CONFIG_FILE.get_or_init(|| config_dir().join("config.json"))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Every resolver caches into a process-wide OnceLock, so all assertions
    // live in this single test.
    #[test]
    fn custom_data_dir_relocates_everything() {
        let tempdir = tempfile::TempDir::new().unwrap();
        let root = set_custom_data_dir(tempdir.path());

        assert!(root.exists());
        assert_eq!(data_dir(), root);
        assert_eq!(config_dir(), &root.join("config"));
        assert_eq!(database_file(), &root.join("db").join("visty.db"));
        assert_eq!(config_file(), &root.join("config").join("config.json"));
        assert_eq!(temp_dir(), &root.join("tmp"));
        assert_eq!(logs_dir(), &root.join("logs"));
    }
}
