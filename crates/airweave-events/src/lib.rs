//! Process-wide event bus: decouples producers (sync orchestrator,
//! lifecycle events) from consumers (webhook forwarder, billing handler,
//! progress relay).
//!
//! Grounded on the platform observer stack's glob matcher (patterns
//! compiled once at subscribe time, never re-parsed per event) and its
//! catch-log-never-propagate handler dispatch loop — generalized here
//! from a two-level `(event_type, entity_type)` index down to single-level
//! `event_type` glob matching, since this bus's patterns (`entity.*`,
//! `sync.*`, `*`) have no entity-type dimension.
//!
//! The teacher's transport supports exactly one consumer per subscription
//! (`fraiseql_observers::transport::in_memory::InMemoryTransport` shares a
//! single receiver). This bus instead gives each named subscriber its own
//! unbounded channel and task, so N subscribers each see every matching
//! event independently — see `DESIGN.md` for this redesign.

pub mod subscribers;

use std::sync::Arc;

use airweave_core::DomainEvent;
use chrono::{DateTime, Utc};
use glob::Pattern;
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// The uniform, type-erased form every concrete `DomainEvent` is lowered
/// into before the bus routes it. Subscribers operate on this shape so
/// the bus does not need a trait object per concrete event type.
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    /// Namespaced event type this event matched subscriptions against.
    pub event_type: String,
    /// When the event was produced.
    pub timestamp: DateTime<Utc>,
    /// Tenant this event is scoped to.
    pub organization_id: Uuid,
    /// The full wire payload, unchanged from the producing event's
    /// `to_webhook_payload()`.
    pub payload: Value,
}

impl PublishedEvent {
    /// Lower a concrete event into its bus-routable form.
    #[must_use]
    pub fn from_event<E: DomainEvent>(event: &E) -> Self {
        Self {
            event_type: event.event_type().to_string(),
            timestamp: event.timestamp(),
            organization_id: event.organization_id(),
            payload: event.to_webhook_payload(),
        }
    }
}

/// A named consumer of bus events. `patterns()` is read once at
/// `subscribe` time; `handle` runs sequentially for this subscriber's own
/// events (events arrive in publish order) but concurrently with every
/// other subscriber's `handle` calls.
#[async_trait::async_trait]
pub trait Subscriber: Send + Sync {
    /// A stable name for logging and for `skip_content_handlers`-style
    /// per-batch filtering elsewhere in the system.
    fn name(&self) -> &str;

    /// Glob patterns over `event_type` this subscriber wants delivered,
    /// e.g. `["entity.*"]` or `["*"]`.
    fn patterns(&self) -> &[&str];

    /// Handle one event. Errors are caught, logged, and never propagated
    /// to the producer or to other subscribers — implementors should
    /// still return `Err` on failure so the bus can log it with context.
    async fn handle(&self, event: &PublishedEvent) -> Result<(), String>;
}

struct SubscriberEntry {
    name: String,
    patterns: Vec<Pattern>,
    sender: mpsc::UnboundedSender<PublishedEvent>,
}

impl SubscriberEntry {
    fn matches(&self, event_type: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(event_type))
    }
}

/// The process-wide fan-out bus. `publish` is non-blocking from the
/// producer's viewpoint: it only needs to push onto each matching
/// subscriber's channel, never wait for delivery.
pub struct EventBus {
    subscribers: RwLock<Vec<SubscriberEntry>>,
}

impl EventBus {
    /// Build an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Register a subscriber, compiling its patterns once and spawning
    /// its dedicated delivery task.
    ///
    /// # Errors
    /// Returns an error string if any of the subscriber's patterns fail
    /// to compile as a glob.
    pub async fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> Result<(), String> {
        let patterns = subscriber
            .patterns()
            .iter()
            .map(|p| Pattern::new(p).map_err(|err| err.to_string()))
            .collect::<Result<Vec<_>, _>>()?;

        let (sender, mut receiver) = mpsc::unbounded_channel::<PublishedEvent>();
        let name = subscriber.name().to_string();

        tokio::spawn({
            let subscriber = subscriber.clone();
            let name = name.clone();
            async move {
                while let Some(event) = receiver.recv().await {
                    if let Err(err) = subscriber.handle(&event).await {
                        tracing::error!(
                            subscriber = %name,
                            event_type = %event.event_type,
                            organization_id = %event.organization_id,
                            error = %err,
                            "event subscriber handler failed; isolated from other subscribers"
                        );
                    }
                }
            }
        });

        self.subscribers.write().await.push(SubscriberEntry {
            name,
            patterns,
            sender,
        });
        Ok(())
    }

    /// Publish an event to every subscriber whose pattern matches its
    /// `event_type`. At-least-once per matching subscriber; delivery
    /// itself happens asynchronously on each subscriber's own task.
    pub async fn publish<E: DomainEvent>(&self, event: &E) {
        let published = PublishedEvent::from_event(event);
        let subscribers = self.subscribers.read().await;
        for entry in subscribers.iter() {
            if entry.matches(&published.event_type) && entry.sender.send(published.clone()).is_err()
            {
                tracing::warn!(
                    subscriber = %entry.name,
                    event_type = %published.event_type,
                    "subscriber channel closed; event dropped"
                );
            }
        }
    }

    /// Number of currently registered subscribers. Exposed for tests and
    /// startup diagnostics.
    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
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
    use airweave_core::events::OrganizationLifecycleEvent;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingSubscriber {
        name: &'static str,
        patterns: Vec<&'static str>,
        count: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl Subscriber for CountingSubscriber {
        fn name(&self) -> &str {
            self.name
        }

        fn patterns(&self) -> &[&str] {
            &self.patterns
        }

        async fn handle(&self, _event: &PublishedEvent) -> Result<(), String> {
            self.count.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err("boom".to_string());
            }
            Ok(())
        }
    }

    async fn drain() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn wildcard_subscriber_receives_every_event_type() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe(Arc::new(CountingSubscriber {
            name: "catch-all",
            patterns: vec!["*"],
            count: count.clone(),
            fail: false,
        }))
        .await
        .unwrap();

        bus.publish(&OrganizationLifecycleEvent::created(Uuid::new_v4())).await;
        drain().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pattern_filters_out_non_matching_event_types() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.subscribe(Arc::new(CountingSubscriber {
            name: "entity-only",
            patterns: vec!["entity.*"],
            count: count.clone(),
            fail: false,
        }))
        .await
        .unwrap();

        bus.publish(&OrganizationLifecycleEvent::created(Uuid::new_v4())).await;
        drain().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn one_subscriber_failing_does_not_block_another() {
        let bus = EventBus::new();
        let failing_count = Arc::new(AtomicUsize::new(0));
        let healthy_count = Arc::new(AtomicUsize::new(0));

        bus.subscribe(Arc::new(CountingSubscriber {
            name: "failing",
            patterns: vec!["*"],
            count: failing_count.clone(),
            fail: true,
        }))
        .await
        .unwrap();
        bus.subscribe(Arc::new(CountingSubscriber {
            name: "healthy",
            patterns: vec!["*"],
            count: healthy_count.clone(),
            fail: false,
        }))
        .await
        .unwrap();

        bus.publish(&OrganizationLifecycleEvent::created(Uuid::new_v4())).await;
        drain().await;

        assert_eq!(failing_count.load(Ordering::SeqCst), 1);
        assert_eq!(healthy_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn multiple_subscribers_on_same_pattern_each_get_their_own_delivery() {
        let bus = EventBus::new();
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));
        bus.subscribe(Arc::new(CountingSubscriber {
            name: "a",
            patterns: vec!["entity.*"],
            count: a.clone(),
            fail: false,
        }))
        .await
        .unwrap();
        bus.subscribe(Arc::new(CountingSubscriber {
            name: "b",
            patterns: vec!["entity.*"],
            count: b.clone(),
            fail: false,
        }))
        .await
        .unwrap();

        let event = airweave_core::events::EntityBatchProcessedEvent::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            1,
            0,
            0,
            0,
            0,
            true,
        );
        bus.publish(&event).await;
        drain().await;

        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }
}
