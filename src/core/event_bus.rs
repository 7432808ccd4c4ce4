//! Pub/Sub event bus for player notifications.
//!
//! - subscribers get callbacks synchronously, on the thread that emits
//!   (for the player: the presentation thread, inside `tick`/host calls)
//! - every emitted event is also queued; hosts drain it with `poll()`
//!
//! Callback order: FIFO within one event type. Nothing is promised across types.

use log::warn;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// Maximum events in queue before oldest are evicted
const MAX_QUEUE_SIZE: usize = 1000;

/// Marker trait for events. Events must be Send + Sync + 'static.
pub trait Event: Any + Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
    fn type_name(&self) -> &'static str;
}

impl<T: Any + Send + Sync + 'static> Event for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

type Callback = Arc<dyn Fn(&dyn Any) + Send + Sync>;

/// Boxed event for queue storage
pub type BoxedEvent = Box<dyn Event>;

#[derive(Default)]
struct Shared {
    subscribers: RwLock<HashMap<TypeId, Vec<Callback>>>,
    queue: Mutex<Vec<BoxedEvent>>,
}

impl Shared {
    fn dispatch(&self, event: BoxedEvent) {
        let type_id = (*event).as_any().type_id();

        // Clone the callback list so a callback may subscribe or emit
        let cbs: Vec<Callback> = self
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&type_id)
            .cloned()
            .unwrap_or_default();
        for cb in cbs {
            cb((*event).as_any());
        }

        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        if queue.len() >= MAX_QUEUE_SIZE {
            let evict_count = queue.len() / 2;
            warn!("EventBus queue full ({} events), evicting oldest {}", queue.len(), evict_count);
            queue.drain(0..evict_count);
        }
        queue.push(event);
    }
}

/// Pub/Sub event bus with deferred processing support.
#[derive(Clone, Default)]
pub struct EventBus {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("queue_len", &self.queue_len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events of type E.
    ///
    /// # Example
    /// ```
    /// # use lotta::core::event_bus::EventBus;
    /// # use lotta::core::events::FrameChangedEvent;
    /// let bus = EventBus::new();
    /// bus.subscribe::<FrameChangedEvent, _>(|e| println!("frame {}", e.0));
    /// bus.emit(FrameChangedEvent(12));
    /// ```
    pub fn subscribe<E, F>(&self, callback: F)
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let wrapped: Callback = Arc::new(move |any: &dyn Any| {
            if let Some(event) = any.downcast_ref::<E>() {
                callback(event);
            }
        });
        self.shared
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(TypeId::of::<E>())
            .or_default()
            .push(wrapped);
    }

    /// Invoke callbacks immediately and queue for `poll()`
    pub fn emit<E: Event>(&self, event: E) {
        self.shared.dispatch(Box::new(event));
    }

    /// Take all queued events
    pub fn poll(&self) -> Vec<BoxedEvent> {
        std::mem::take(&mut *self.shared.queue.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Take queued events of type E, leaving others queued
    pub fn poll_of<E: Event + Clone>(&self) -> Vec<E> {
        let mut queue = self.shared.queue.lock().unwrap_or_else(|e| e.into_inner());
        let mut out = Vec::new();
        queue.retain(|ev| match downcast_event::<E>(ev) {
            Some(e) => {
                out.push(e.clone());
                false
            }
            None => true,
        });
        out
    }

    /// Emitter handle for components that only publish
    pub fn emitter(&self) -> EventEmitter {
        EventEmitter {
            inner: Some(Arc::clone(&self.shared)),
        }
    }

    /// Clear subscribers for type E
    pub fn unsubscribe_all<E: Event>(&self) {
        self.shared
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&TypeId::of::<E>());
    }

    pub fn has_subscribers<E: Event>(&self) -> bool {
        self.shared
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&TypeId::of::<E>())
            .map(|v| !v.is_empty())
            .unwrap_or(false)
    }

    pub fn queue_len(&self) -> usize {
        self.shared.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Publish-only handle. `dummy()` drops everything (players built without a bus).
#[derive(Clone, Default)]
pub struct EventEmitter {
    inner: Option<Arc<Shared>>,
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("connected", &self.inner.is_some())
            .finish()
    }
}

impl EventEmitter {
    /// No-op emitter
    pub fn dummy() -> Self {
        Self { inner: None }
    }

    pub fn emit<E: Event>(&self, event: E) {
        if let Some(shared) = &self.inner {
            shared.dispatch(Box::new(event));
        }
    }
}

/// Downcast a queued event to its concrete type.
///
/// Derefs to `dyn Event` first; calling `as_any()` on the `Box` itself would
/// hit the blanket impl and yield the box, not the event.
#[inline]
pub fn downcast_event<E: Event>(event: &BoxedEvent) -> Option<&E> {
    (**event).as_any().downcast_ref::<E>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::events::{AnimationLoadedEvent, FrameChangedEvent, RedrawRequestedEvent};
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn test_subscribe_emit_immediate() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicI32::new(0));
        let c = Arc::clone(&counter);

        bus.subscribe::<FrameChangedEvent, _>(move |e| {
            c.fetch_add(e.0, Ordering::SeqCst);
        });

        bus.emit(FrameChangedEvent(10));
        assert_eq!(counter.load(Ordering::SeqCst), 10);
        bus.emit(FrameChangedEvent(5));
        assert_eq!(counter.load(Ordering::SeqCst), 15);
        // other types don't reach the callback
        bus.emit(RedrawRequestedEvent);
        assert_eq!(counter.load(Ordering::SeqCst), 15);
    }

    #[test]
    fn test_emit_queues_for_poll() {
        let bus = EventBus::new();
        bus.emit(FrameChangedEvent(1));
        bus.emit(RedrawRequestedEvent);
        bus.emit(AnimationLoadedEvent(true));

        assert_eq!(bus.poll().len(), 3);
        assert_eq!(bus.poll().len(), 0);
    }

    #[test]
    fn test_poll_of_filters() {
        let bus = EventBus::new();
        bus.emit(FrameChangedEvent(1));
        bus.emit(RedrawRequestedEvent);
        bus.emit(FrameChangedEvent(2));

        let frames = bus.poll_of::<FrameChangedEvent>();
        assert_eq!(frames, vec![FrameChangedEvent(1), FrameChangedEvent(2)]);
        assert_eq!(bus.queue_len(), 1);
    }

    #[test]
    fn test_emitter_handle() {
        let bus = EventBus::new();
        let counter = Arc::new(AtomicI32::new(0));
        let c = Arc::clone(&counter);
        bus.subscribe::<FrameChangedEvent, _>(move |e| {
            c.fetch_add(e.0, Ordering::SeqCst);
        });

        bus.emitter().emit(FrameChangedEvent(42));
        assert_eq!(counter.load(Ordering::SeqCst), 42);
        assert_eq!(bus.poll().len(), 1);

        // dummy goes nowhere
        EventEmitter::dummy().emit(FrameChangedEvent(1));
        assert_eq!(counter.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = EventBus::new();
        bus.subscribe::<RedrawRequestedEvent, _>(|_| {});
        assert!(bus.has_subscribers::<RedrawRequestedEvent>());
        bus.unsubscribe_all::<RedrawRequestedEvent>();
        assert!(!bus.has_subscribers::<RedrawRequestedEvent>());
    }

    #[test]
    fn test_downcast() {
        let bus = EventBus::new();
        bus.emit(AnimationLoadedEvent(false));
        let events = bus.poll();
        assert_eq!(downcast_event::<AnimationLoadedEvent>(&events[0]), Some(&AnimationLoadedEvent(false)));
        assert!(downcast_event::<FrameChangedEvent>(&events[0]).is_none());
    }
}
