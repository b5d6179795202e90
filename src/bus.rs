//! In-process typed publish/subscribe event bus
//!
//! Dispatch is synchronous and ordered: type-specific subscribers fire
//! before wildcard subscribers, each group in registration order. A failing
//! handler is caught and logged at the bus boundary and never prevents
//! delivery to the remaining subscribers, nor reaches the publisher.
//!
//! Publishes are serialized through the bus mutex to preserve ordering;
//! handlers run outside the lock so they may publish follow-up events.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};

/// Published event names used across the engine
pub mod events {
    pub const BATCH_STARTED: &str = "batch:started";
    pub const BATCH_PROGRESS: &str = "batch:progress";
    pub const BATCH_COMPLETED: &str = "batch:completed";
    pub const SIGNATURE_EXTRACTED: &str = "signature:extracted";
    pub const PATTERN_MATCHED: &str = "pattern:matched";
    pub const PATTERN_NOTFOUND: &str = "pattern:notfound";
    pub const RESONANCE_INSIGHT: &str = "resonance:insight";
    pub const RESONANCE_HEALTHCHECK: &str = "resonance:healthcheck";
    pub const ERROR_BATCH: &str = "error:batch";

    /// Wildcard subscription type, delivered after type-specific subscribers
    pub const WILDCARD: &str = "*";
}

/// A published event as stored in history and handed to handlers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusEvent {
    pub event_type: String,
    pub payload: serde_json::Value,
    pub metadata: Option<serde_json::Value>,
    /// Unix timestamp (seconds) at publish time
    pub timestamp: i64,
}

pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

type Handler = Arc<dyn Fn(&BusEvent) -> HandlerResult + Send + Sync>;
type Filter = Arc<dyn Fn(&BusEvent) -> bool + Send + Sync>;

struct Subscriber {
    id: u64,
    event_type: String,
    handler: Handler,
    filter: Option<Filter>,
}

struct BusInner {
    subscribers: Vec<Subscriber>,
    history: VecDeque<BusEvent>,
    history_limit: usize,
    next_id: u64,
}

/// Handle returned by `subscribe`; dropping it does NOT unsubscribe.
pub struct Subscription {
    id: u64,
    inner: Weak<Mutex<BusInner>>,
}

impl Subscription {
    /// Remove this subscriber. Safe to call repeatedly or after `clear()`.
    pub fn unsubscribe(&self) {
        if let Some(inner) = self.inner.upgrade() {
            let mut guard = inner.lock().unwrap();
            guard.subscribers.retain(|s| s.id != self.id);
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    /// Bus with the default history bound of 100 events
    pub fn new() -> Self {
        Self::with_history_limit(100)
    }

    pub fn with_history_limit(history_limit: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                subscribers: Vec::new(),
                history: VecDeque::with_capacity(history_limit),
                history_limit,
                next_id: 0,
            })),
        }
    }

    /// Subscribe to an event type, or to all events with `events::WILDCARD`.
    pub fn subscribe<H>(&self, event_type: &str, handler: H) -> Subscription
    where
        H: Fn(&BusEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.register(event_type, Arc::new(handler), None)
    }

    /// Subscribe with a predicate; a false result skips this handler only.
    pub fn subscribe_filtered<F, H>(&self, event_type: &str, filter: F, handler: H) -> Subscription
    where
        F: Fn(&BusEvent) -> bool + Send + Sync + 'static,
        H: Fn(&BusEvent) -> HandlerResult + Send + Sync + 'static,
    {
        self.register(event_type, Arc::new(handler), Some(Arc::new(filter)))
    }

    fn register(&self, event_type: &str, handler: Handler, filter: Option<Filter>) -> Subscription {
        let mut guard = self.inner.lock().unwrap();
        let id = guard.next_id;
        guard.next_id += 1;
        guard.subscribers.push(Subscriber {
            id,
            event_type: event_type.to_string(),
            handler,
            filter,
        });

        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn publish(&self, event_type: &str, payload: serde_json::Value) {
        self.publish_with_metadata(event_type, payload, None);
    }

    pub fn publish_with_metadata(
        &self,
        event_type: &str,
        payload: serde_json::Value,
        metadata: Option<serde_json::Value>,
    ) {
        let event = BusEvent {
            event_type: event_type.to_string(),
            payload,
            metadata,
            timestamp: chrono::Utc::now().timestamp(),
        };

        // Record history and snapshot matching handlers under the lock,
        // then dispatch outside it so handlers can publish themselves.
        let handlers: Vec<(Handler, Option<Filter>)> = {
            let mut guard = self.inner.lock().unwrap();
            guard.history.push_back(event.clone());
            while guard.history.len() > guard.history_limit {
                guard.history.pop_front();
            }

            let typed = guard
                .subscribers
                .iter()
                .filter(|s| s.event_type == event.event_type && s.event_type != events::WILDCARD);
            let wildcard = guard
                .subscribers
                .iter()
                .filter(|s| s.event_type == events::WILDCARD);
            typed
                .chain(wildcard)
                .map(|s| (Arc::clone(&s.handler), s.filter.clone()))
                .collect()
        };

        for (handler, filter) in handlers {
            if let Some(filter) = filter {
                if !filter(&event) {
                    continue;
                }
            }
            if let Err(e) = handler(&event) {
                log::error!("event handler failed for '{}': {}", event.event_type, e);
            }
        }
    }

    /// Last N published events, oldest first, optionally filtered by type
    pub fn history(&self, event_type: Option<&str>) -> Vec<BusEvent> {
        let guard = self.inner.lock().unwrap();
        guard
            .history
            .iter()
            .filter(|e| event_type.map_or(true, |t| e.event_type == t))
            .cloned()
            .collect()
    }

    /// Drop all subscriptions and history
    pub fn clear(&self) {
        let mut guard = self.inner.lock().unwrap();
        guard.subscribers.clear();
        guard.history.clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().unwrap().subscribers.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record_order(log: &Arc<Mutex<Vec<String>>>, tag: &str) -> impl Fn(&BusEvent) -> HandlerResult {
        let log = Arc::clone(log);
        let tag = tag.to_string();
        move |_event| {
            log.lock().unwrap().push(tag.clone());
            Ok(())
        }
    }

    #[test]
    fn test_typed_before_wildcard_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        // Wildcard registered first must still fire after typed subscribers
        let _w = bus.subscribe(events::WILDCARD, record_order(&order, "wildcard"));
        let _a = bus.subscribe("batch:progress", record_order(&order, "typed_a"));
        let _b = bus.subscribe("batch:progress", record_order(&order, "typed_b"));

        bus.publish("batch:progress", json!({"completed": 1}));

        let seen = order.lock().unwrap().clone();
        assert_eq!(seen, vec!["typed_a", "typed_b", "wildcard"]);
    }

    #[test]
    fn test_failing_handler_does_not_block_others() {
        let bus = EventBus::new();
        let received = Arc::new(Mutex::new(0usize));

        let _bad = bus.subscribe(events::BATCH_PROGRESS, |_e| Err("handler exploded".into()));

        let counter = Arc::clone(&received);
        let _good = bus.subscribe(events::BATCH_PROGRESS, move |_e| {
            *counter.lock().unwrap() += 1;
            Ok(())
        });

        for _ in 0..5 {
            bus.publish(events::BATCH_PROGRESS, json!({}));
        }

        assert_eq!(*received.lock().unwrap(), 5);
    }

    #[test]
    fn test_filter_skips_handler_only() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let _filtered = {
            let log = Arc::clone(&order);
            bus.subscribe_filtered(
                "sig",
                |e| e.payload["intensity"].as_f64().unwrap_or(0.0) > 0.5,
                move |_e| {
                    log.lock().unwrap().push("filtered".to_string());
                    Ok(())
                },
            )
        };
        let _plain = bus.subscribe("sig", record_order(&order, "plain"));

        bus.publish("sig", json!({"intensity": 0.2}));
        bus.publish("sig", json!({"intensity": 0.9}));

        let seen = order.lock().unwrap().clone();
        assert_eq!(seen, vec!["plain", "filtered", "plain"]);
    }

    #[test]
    fn test_unsubscribe_idempotent() {
        let bus = EventBus::new();
        let sub = bus.subscribe("x", |_e| Ok(()));
        assert_eq!(bus.subscriber_count(), 1);

        sub.unsubscribe();
        sub.unsubscribe();
        assert_eq!(bus.subscriber_count(), 0);

        bus.clear();
        sub.unsubscribe(); // safe after clear
    }

    #[test]
    fn test_history_bounded_and_filtered() {
        let bus = EventBus::with_history_limit(3);
        for i in 0..5 {
            bus.publish("a", json!({"i": i}));
        }
        bus.publish("b", json!({}));

        let all = bus.history(None);
        assert_eq!(all.len(), 3);
        // Oldest evicted first: remaining are a{3}, a{4}, b
        assert_eq!(all[0].payload["i"], 3);
        assert_eq!(all[2].event_type, "b");

        let only_a = bus.history(Some("a"));
        assert_eq!(only_a.len(), 2);
    }

    #[test]
    fn test_zero_history_limit_retains_nothing() {
        let bus = EventBus::with_history_limit(0);
        let hits = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&hits);
        let _sub = bus.subscribe("x", move |_e| {
            *counter.lock().unwrap() += 1;
            Ok(())
        });

        for _ in 0..10 {
            bus.publish("x", json!({}));
        }

        // Delivery still happens; nothing is retained
        assert_eq!(*hits.lock().unwrap(), 10);
        assert!(bus.history(None).is_empty());
    }

    #[test]
    fn test_clear_drops_subscriptions_and_history() {
        let bus = EventBus::new();
        let hits = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&hits);
        let _sub = bus.subscribe("x", move |_e| {
            *counter.lock().unwrap() += 1;
            Ok(())
        });

        bus.publish("x", json!({}));
        bus.clear();
        bus.publish("x", json!({}));

        assert_eq!(*hits.lock().unwrap(), 1);
        assert!(bus.history(None).len() == 1); // only the post-clear publish
    }

    #[test]
    fn test_handler_may_publish_followup() {
        let bus = EventBus::new();
        let chained = bus.clone();
        let _sub = bus.subscribe("first", move |_e| {
            chained.publish("second", json!({}));
            Ok(())
        });

        bus.publish("first", json!({}));
        assert_eq!(bus.history(Some("second")).len(), 1);
    }
}
