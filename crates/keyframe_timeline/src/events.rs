// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed change notifications for tracks and timelines.
//!
//! Listeners run synchronously, in subscription order, on the caller's
//! stack as part of the mutation that produced the event.

use crate::binding::{ObjectUuid, TrackKey};
use crate::keyframe::{InterpolationMode, Keyframe, Vec3};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Boxed event listener
pub type Listener<E> = Box<dyn FnMut(&E) + Send>;

/// Ordered list of listeners for one event type
pub struct EventBus<E> {
    listeners: Vec<(ListenerId, Listener<E>)>,
    next_id: u64,
}

impl<E> EventBus<E> {
    /// Create an empty bus
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
            next_id: 1,
        }
    }

    /// Register a listener
    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&E) + Send + 'static,
    {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener; returns false if it was not registered
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    /// Deliver an event to every listener
    pub fn emit(&mut self, event: &E) {
        for (_, listener) in &mut self.listeners {
            listener(event);
        }
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Whether no listener is registered
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Drop every listener
    pub fn clear(&mut self) {
        self.listeners.clear();
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

// Listeners belong to the instance they were registered on; a clone starts empty.
impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Kind of keyframe change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackEventKind {
    /// Keyframe inserted
    Added,
    /// Keyframe deleted
    Removed,
    /// Keyframe value or interpolation changed in place
    Updated,
    /// Keyframe time changed
    Moved,
}

impl TrackEventKind {
    /// Event name as seen on a single track
    pub fn name(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Removed => "removed",
            Self::Updated => "updated",
            Self::Moved => "moved",
        }
    }

    /// Event name when re-emitted by a timeline
    pub fn timeline_name(self) -> &'static str {
        match self {
            Self::Added => "track_added",
            Self::Removed => "track_removed",
            Self::Updated => "track_updated",
            Self::Moved => "track_moved",
        }
    }
}

/// Change notification emitted by a single track
#[derive(Debug, Clone, PartialEq)]
pub enum TrackEvent {
    /// A keyframe was inserted at `index`
    Added {
        /// Index after insertion
        index: usize,
        /// Inserted keyframe
        keyframe: Keyframe,
    },
    /// The keyframe formerly at `index` was deleted
    Removed {
        /// Index before removal
        index: usize,
        /// Removed keyframe
        keyframe: Keyframe,
    },
    /// The keyframe at `index` changed in place
    Updated {
        /// Keyframe index
        index: usize,
        /// Value before the change
        previous: Vec3,
        /// Interpolation mode before the change
        previous_interpolation: InterpolationMode,
        /// Keyframe after the change
        keyframe: Keyframe,
    },
    /// A keyframe changed time and now sits at `index`
    Moved {
        /// Time before the move
        from_time: f32,
        /// Index after re-sorting
        index: usize,
        /// Keyframe after the move
        keyframe: Keyframe,
    },
}

impl TrackEvent {
    /// Kind of this event
    pub fn kind(&self) -> TrackEventKind {
        match self {
            Self::Added { .. } => TrackEventKind::Added,
            Self::Removed { .. } => TrackEventKind::Removed,
            Self::Updated { .. } => TrackEventKind::Updated,
            Self::Moved { .. } => TrackEventKind::Moved,
        }
    }

    /// Keyframe carried by the event
    pub fn keyframe(&self) -> &Keyframe {
        match self {
            Self::Added { keyframe, .. }
            | Self::Removed { keyframe, .. }
            | Self::Updated { keyframe, .. }
            | Self::Moved { keyframe, .. } => keyframe,
        }
    }
}

/// Change notification emitted by a timeline
#[derive(Debug, Clone, PartialEq)]
pub enum TimelineEvent {
    /// A track was created by `add_track`
    TrackCreated(TrackKey),
    /// A track was removed
    TrackRemoved(TrackKey),
    /// A keyframe changed on one of the timeline's tracks
    Track {
        /// Track that changed
        key: TrackKey,
        /// Underlying track event
        event: TrackEvent,
    },
}

impl TimelineEvent {
    /// Event name (`track_created`, `track_deleted`, `track_added`, ...)
    pub fn name(&self) -> &'static str {
        match self {
            Self::TrackCreated(_) => "track_created",
            Self::TrackRemoved(_) => "track_deleted",
            Self::Track { event, .. } => event.kind().timeline_name(),
        }
    }

    /// Object the event concerns
    pub fn object(&self) -> ObjectUuid {
        match self {
            Self::TrackCreated(key) | Self::TrackRemoved(key) | Self::Track { key, .. } => {
                key.object
            }
        }
    }
}

/// State shared between a timeline and the tracks it owns
#[derive(Debug)]
pub(crate) struct TimelineHub {
    pub(crate) dirty: bool,
    pub(crate) max_time: f32,
    pub(crate) bus: EventBus<TimelineEvent>,
}

impl TimelineHub {
    pub(crate) fn shared() -> SharedHub {
        Arc::new(Mutex::new(Self {
            dirty: true,
            max_time: 0.0,
            bus: EventBus::new(),
        }))
    }

    pub(crate) fn publish(&mut self, event: TimelineEvent) {
        self.dirty = true;
        self.bus.emit(&event);
    }
}

pub(crate) type SharedHub = Arc<Mutex<TimelineHub>>;

/// Connection from a track to the timeline that owns it
#[derive(Debug, Clone)]
pub(crate) struct TrackLink {
    pub(crate) key: TrackKey,
    pub(crate) hub: SharedHub,
}

impl TrackLink {
    /// Re-emit a track event on the timeline bus, marking it dirty
    pub(crate) fn forward(&self, event: &TrackEvent) {
        let mut hub = self.hub.lock();
        if let TrackEvent::Added { keyframe, .. } | TrackEvent::Moved { keyframe, .. } = event {
            hub.max_time = hub.max_time.max(keyframe.time);
        }
        hub.publish(TimelineEvent::Track {
            key: self.key.clone(),
            event: event.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_subscribe_emit_unsubscribe() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut bus: EventBus<u32> = EventBus::new();

        let counter = hits.clone();
        let id = bus.subscribe(move |value| {
            counter.fetch_add(*value as usize, Ordering::SeqCst);
        });
        bus.emit(&2);
        bus.emit(&3);
        assert_eq!(hits.load(Ordering::SeqCst), 5);

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(&10);
        assert_eq!(hits.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_clone_drops_listeners() {
        let mut bus: EventBus<()> = EventBus::new();
        bus.subscribe(|_| {});
        assert_eq!(bus.len(), 1);
        assert!(bus.clone().is_empty());
    }

    #[test]
    fn test_event_names() {
        let key = TrackKey::new(ObjectUuid::new(), "position");
        let event = TimelineEvent::Track {
            key: key.clone(),
            event: TrackEvent::Moved {
                from_time: 0.0,
                index: 0,
                keyframe: Keyframe::new(1.0, [0.0; 3]),
            },
        };
        assert_eq!(event.name(), "track_moved");
        assert_eq!(event.object(), key.object);
        assert_eq!(TrackEventKind::Added.name(), "added");
    }
}
