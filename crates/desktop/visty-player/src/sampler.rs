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

//! Periodic mirroring of the media element into the window state.

use std::{sync::Arc, time::Duration};

use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::{
    state::{ChangeSource, Volume, WindowId, WindowPatch, WindowState, WindowStore},
    util::ResultExt as _,
};

const EPSILON: f64 = 1e-3;

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// What the media element reports at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaSample {
    pub current_time: f64,
    pub duration:     Option<f64>,
    pub volume:       f64,
    pub muted:        bool,
}

/// Read access to the media element of one window.
pub trait MediaProbe: Send + Sync {
    /// Current playback values, `None` while nothing is loaded.
    fn sample(&self) -> Option<MediaSample>;

    fn seek(&self, time: f64);
}

/// Samples `probe` every `period` and writes differences into the store as
/// [`ChangeSource::Sampled`] updates. Also keeps playback inside the partial
/// loop, if one is set. Stops once the window is gone from the store.
/// Periods shorter than a millisecond are raised to one.
pub fn spawn_sampler(
    store: WindowStore,
    id: WindowId,
    probe: Arc<dyn MediaProbe>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period.max(MIN_PERIOD));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let Ok(window) = store.get_window(id) else {
                tracing::debug!(%id, "window gone, sampler stopped");
                break;
            };
            let Some(mut sample) = probe.sample() else {
                continue;
            };

            if let Some(range) = window.loop_range {
                if !range.contains(sample.current_time) {
                    probe.seek(range.start());
                    sample.current_time = range.start();
                }
            }

            if let Some(patch) = sample_patch(&window, &sample) {
                store.update_window_from(id, patch, ChangeSource::Sampled).log_err();
            }
        }
    })
}

/// The fields of `sample` that differ from `window`, `None` when nothing
/// changed.
fn sample_patch(window: &WindowState, sample: &MediaSample) -> Option<WindowPatch> {
    let differs = |a: f64, b: f64| (a - b).abs() > EPSILON;

    let patch = WindowPatch {
        current_time: differs(window.current_time, sample.current_time)
            .then_some(sample.current_time),
        duration: sample
            .duration
            .filter(|duration| window.duration.is_none_or(|known| differs(known, *duration))),
        volume: differs(window.volume.value(), sample.volume).then(|| Volume::new(sample.volume)),
        muted: (window.muted != sample.muted).then_some(sample.muted),
        ..Default::default()
    };

    (patch != WindowPatch::default()).then_some(patch)
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;

    use super::*;
    use crate::state::{LoopRange, StoreChange};

    struct FakeProbe {
        time:  Mutex<f64>,
        seeks: Mutex<Vec<f64>>,
    }

    impl FakeProbe {
        fn at(time: f64) -> Arc<Self> {
            Arc::new(Self {
                time:  Mutex::new(time),
                seeks: Mutex::new(Vec::new()),
            })
        }
    }

    impl MediaProbe for FakeProbe {
        fn sample(&self) -> Option<MediaSample> {
            Some(MediaSample {
                current_time: *self.time.lock(),
                duration:     Some(60.0),
                volume:       1.0,
                muted:        false,
            })
        }

        fn seek(&self, time: f64) {
            *self.time.lock() = time;
            self.seeks.lock().push(time);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn playback_past_the_loop_end_jumps_back() {
        let store = WindowStore::default();
        let id = WindowId::new(1);
        let window = WindowState {
            loop_range: Some(LoopRange::new(10.0, 20.0, None).unwrap()),
            ..Default::default()
        };
        store.create_window(id, window).unwrap();
        let mut changes = store.subscribe();
        changes.recv().await.unwrap();

        let probe = FakeProbe::at(21.5);
        let task = spawn_sampler(store.clone(), id, probe.clone(), Duration::from_millis(250));

        let event = changes.recv().await.unwrap();
        assert_eq!(event.change, StoreChange::WindowUpdated(id));
        assert_eq!(event.source, ChangeSource::Sampled);
        assert_eq!(probe.seeks.lock().as_slice(), &[10.0]);

        let window = store.get_window(id).unwrap();
        assert!((window.current_time - 10.0).abs() < f64::EPSILON);
        assert_eq!(window.duration, Some(60.0));

        store.remove_window(id);
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn zero_period_still_samples() {
        let store = WindowStore::default();
        let id = WindowId::new(1);
        store.create_window(id, WindowState::default()).unwrap();
        let mut changes = store.subscribe();

        let task = spawn_sampler(store.clone(), id, FakeProbe::at(3.0), Duration::ZERO);
        let event = changes.recv().await.unwrap();
        assert_eq!(event.source, ChangeSource::Sampled);
        assert!((store.get_window(id).unwrap().current_time - 3.0).abs() < f64::EPSILON);

        store.remove_window(id);
        task.await.unwrap();
    }

    #[test]
    fn unchanged_samples_produce_no_patch() {
        let window = WindowState {
            current_time: 5.0,
            duration: Some(60.0),
            ..Default::default()
        };
        let sample = MediaSample {
            current_time: 5.0,
            duration:     Some(60.0),
            volume:       1.0,
            muted:        false,
        };
        assert_eq!(sample_patch(&window, &sample), None);

        let moved = MediaSample { current_time: 6.0, ..sample };
        assert_eq!(sample_patch(&window, &moved).unwrap().current_time, Some(6.0));
    }
}
