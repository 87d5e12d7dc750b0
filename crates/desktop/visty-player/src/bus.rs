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

//! Fire-and-forget events between the main process and player windows.
//!
//! Delivery is at most once to the subscribers alive at publish time, in
//! publish order per subscriber. Anything that must survive a missed event
//! goes through persistence instead.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};

use crate::{
    media::MediaFile,
    state::{PlaybackRate, ViewMode, Volume, WindowId},
};

/// Version of the event vocabulary carried by every envelope.
pub const PROTOCOL_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, strum_macros::EnumDiscriminants)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
#[strum_discriminants(
    name(EventKind),
    derive(strum_macros::EnumString, strum_macros::AsRefStr, strum_macros::Display),
    strum(serialize_all = "camelCase")
)]
pub enum Event {
    ChangeFile { file: MediaFile },
    ToggleLoop,
    ToggleMute,
    ToggleAutoplay,
    ToggleFullscreen,
    TogglePictureInPicture,
    ZoomIn,
    ZoomOut,
    ResetZoom,
    SetPlaybackRate { rate: PlaybackRate },
    SetLoopRange { start: f64, end: f64 },
    ClearLoopRange,
    NextTrack,
    PreviousTrack,
    SetDefaultViewMode { view_mode_on_open: ViewMode },
    SetDefaultLoop { value: bool },
    SetDefaultMuted { value: bool },
    SetDefaultAutoplay { value: bool },
    SetDefaultVolume { volume: Volume },
    WindowOpened { id: WindowId },
    WindowClosed { id: WindowId },
}

impl Event {
    pub fn kind(&self) -> EventKind { EventKind::from(self) }

    /// Parses an event received as JSON. Unknown or malformed events are
    /// dropped with a debug log.
    pub fn decode(value: serde_json::Value) -> Option<Self> {
        let tag = value.get("type").and_then(serde_json::Value::as_str);
        if tag.and_then(|tag| EventKind::from_str(tag).ok()).is_none() {
            tracing::debug!(?tag, "dropping event of unknown type");
            return None;
        }
        serde_json::from_value(value)
            .inspect_err(|error| tracing::debug!(%error, "dropping malformed event"))
            .ok()
    }
}

/// An event plus routing information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub version: u32,
    /// Only this window handles the event; `None` means every window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target:  Option<WindowId>,
    pub event:   Event,
}

impl Envelope {
    pub const fn new(target: Option<WindowId>, event: Event) -> Self {
        Self { version: PROTOCOL_VERSION, target, event }
    }

    /// Parses an envelope from its JSON text, dropping envelopes that carry
    /// an unknown event.
    pub fn decode(raw: &str) -> Option<Self> {
        let mut value: serde_json::Value = serde_json::from_str(raw)
            .inspect_err(|error| tracing::debug!(%error, "dropping malformed envelope"))
            .ok()?;
        let event = Event::decode(value.get_mut("event")?.take())?;
        let version = value
            .get("version")
            .and_then(serde_json::Value::as_u64)
            .and_then(|version| u32::try_from(version).ok())
            .unwrap_or(PROTOCOL_VERSION);
        let target = value
            .get("target")
            .and_then(|target| serde_json::from_value(target.clone()).ok());
        Some(Self { version, target, event })
    }

    pub fn is_for(&self, window: WindowId) -> bool { self.target.is_none_or(|target| target == window) }
}

#[derive(Clone)]
pub struct MessageBus {
    sender: broadcast::Sender<Envelope>,
}

impl MessageBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Sends `event` to every window. Returns how many subscribers got it.
    pub fn publish(&self, event: Event) -> usize { self.send(Envelope::new(None, event)) }

    /// Sends `event` to a single window.
    pub fn publish_to(&self, window: WindowId, event: Event) -> usize {
        self.send(Envelope::new(Some(window), event))
    }

    /// Publishes an envelope received as JSON text, e.g. from a window
    /// process. Returns `false` when it was dropped.
    pub fn publish_raw(&self, raw: &str) -> bool {
        Envelope::decode(raw).is_some_and(|envelope| {
            self.send(envelope);
            true
        })
    }

    fn send(&self, envelope: Envelope) -> usize {
        tracing::trace!(kind = %envelope.event.kind(), target = ?envelope.target, "publish");
        self.sender.send(envelope).unwrap_or(0)
    }

    /// Subscribes to every envelope.
    pub fn subscribe(&self) -> Subscription { Subscription { rx: self.sender.subscribe(), window: None } }

    /// Subscribes to envelopes broadcast to all windows or targeted at
    /// `window`.
    pub fn subscribe_window(&self, window: WindowId) -> Subscription {
        Subscription {
            rx:     self.sender.subscribe(),
            window: Some(window),
        }
    }

    /// Runs `handler` for every event seen by the subscription until the
    /// returned handle is dropped or the bus goes away.
    pub fn subscribe_with<F>(&self, window: Option<WindowId>, mut handler: F) -> SubscriptionHandle
    where
        F: FnMut(Event) + Send + 'static,
    {
        let mut subscription = Subscription {
            rx: self.sender.subscribe(),
            window,
        };
        let task = tokio::spawn(async move {
            while let Some(envelope) = subscription.recv().await {
                handler(envelope.event);
            }
        });
        SubscriptionHandle::new(task)
    }
}

pub struct Subscription {
    rx:     broadcast::Receiver<Envelope>,
    window: Option<WindowId>,
}

impl Subscription {
    /// Next envelope for this subscriber, `None` once the bus is gone.
    /// Events lost to a slow subscriber are skipped.
    pub async fn recv(&mut self) -> Option<Envelope> {
        loop {
            match self.rx.recv().await {
                Ok(envelope) => {
                    if self.window.is_none_or(|window| envelope.is_for(window)) {
                        return Some(envelope);
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, window = ?self.window, "bus subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

/// Unsubscribes when dropped.
pub struct SubscriptionHandle {
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    pub(crate) const fn new(task: JoinHandle<()>) -> Self { Self { task } }

    pub fn unsubscribe(self) {}
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) { self.task.abort(); }
}
