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

//! Panics are logged through `tracing` with the panicking thread and a
//! backtrace, then passed on to the previously installed hook.

use std::{
    panic::{self, PanicHookInfo},
    sync::{
        Once,
        atomic::{AtomicUsize, Ordering},
    },
};

use backtrace::Backtrace;

static PANICS: AtomicUsize = AtomicUsize::new(0);

/// Number of panics observed since [`set_panic_hook`] was installed.
pub fn panic_count() -> usize { PANICS.load(Ordering::Relaxed) }

/// Installs the logging panic hook. Later calls are no-ops.
pub fn set_panic_hook() {
    static INSTALLED: Once = Once::new();

    INSTALLED.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            PANICS.fetch_add(1, Ordering::Relaxed);

            let thread = std::thread::current();
            let thread = thread.name().unwrap_or("<unnamed>");
            let backtrace = format!("{:?}", Backtrace::new());
            let (file, line) = info
                .location()
                .map_or(("<unknown>", 0), |location| (location.file(), location.line()));

            tracing::error!(
                thread,
                panic.file = file,
                panic.line = line,
                backtrace = %backtrace,
                "panicked: {}",
                payload(info),
            );
            previous(info);
        }));
    });
}

fn payload<'a>(info: &'a PanicHookInfo<'_>) -> &'a str {
    let payload = info.payload();
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("Box<dyn Any>")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panics_are_counted() {
        set_panic_hook();
        set_panic_hook();
        let before = panic_count();

        let result = std::thread::Builder::new()
            .name("doomed".to_string())
            .spawn(|| panic!("boom"))
            .unwrap()
            .join();

        assert!(result.is_err());
        assert!(panic_count() > before);
    }
}
