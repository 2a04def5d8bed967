//! Typed event subscriptions.
//!
//! Listeners are registered per [`EventKind`] and called synchronously, once
//! per emitted event, outside the hub's lock so a listener may subscribe or
//! unsubscribe while being called.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use scan_geometry::Region;

use crate::core::frame::Frame;
use crate::lock;
use crate::playback::PlayInfo;

#[derive(Clone, Debug)]
pub enum EnhancerEvent {
    Played(PlayInfo),
    Paused,
    Resumed,
    Closed,
    /// Frame captured right after opening a single-frame source.
    SingleFrameAcquired(Frame),
    ScanRegionChanged(Region),
    FetchingLoopStarted,
    FetchingLoopStopped,
    VisibilityChanged { visible: bool },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKind {
    Played,
    Paused,
    Resumed,
    Closed,
    SingleFrameAcquired,
    ScanRegionChanged,
    FetchingLoopStarted,
    FetchingLoopStopped,
    VisibilityChanged,
}

impl EnhancerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Played(_) => EventKind::Played,
            Self::Paused => EventKind::Paused,
            Self::Resumed => EventKind::Resumed,
            Self::Closed => EventKind::Closed,
            Self::SingleFrameAcquired(_) => EventKind::SingleFrameAcquired,
            Self::ScanRegionChanged(_) => EventKind::ScanRegionChanged,
            Self::FetchingLoopStarted => EventKind::FetchingLoopStarted,
            Self::FetchingLoopStopped => EventKind::FetchingLoopStopped,
            Self::VisibilityChanged { .. } => EventKind::VisibilityChanged,
        }
    }
}

/// Returned by [`EventHub::subscribe`], used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&EnhancerEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: BTreeMap<ListenerId, (EventKind, Listener)>,
}

#[derive(Clone, Default)]
pub struct EventHub {
    registry: Arc<Mutex<Registry>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&EnhancerEvent) + Send + Sync + 'static,
    {
        let mut registry = lock(&self.registry);
        registry.next_id += 1;
        let id = ListenerId(registry.next_id);
        registry.listeners.insert(id, (kind, Arc::new(listener)));
        id
    }

    /// Returns whether the listener was registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        lock(&self.registry).listeners.remove(&id).is_some()
    }

    /// Deliver `event` to its listeners in subscription order.
    pub fn emit(&self, event: EnhancerEvent) {
        let kind = event.kind();
        let listeners: Vec<Listener> = lock(&self.registry)
            .listeners
            .values()
            .filter(|(k, _)| *k == kind)
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(&event);
        }
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.registry).listeners.len()
    }

    pub fn clear(&self) {
        lock(&self.registry).listeners.clear();
    }
}
