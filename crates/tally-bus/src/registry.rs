//! Topic listener registry.
//!
//! Handlers register against a [`Topic`] before the consumer starts; the
//! registry is then frozen behind an `Arc` and only read. Dispatch runs every
//! handler for the event's topic, in registration order, on the calling
//! task. A handler that returns an error or panics is logged under its name
//! and does not prevent later handlers from running.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tally_types::{EventEnvelope, Topic};
use tracing::{error, trace, warn};

use crate::error::HandlerError;

/// A listener for events on one or more topics.
pub trait EventHandler: Send + Sync {
    /// Handle one event.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] when the event could not be handled. The
    /// registry logs it; nothing is retried.
    fn handle(&self, event: &EventEnvelope) -> Result<(), HandlerError>;

    /// Name used in logs.
    fn name(&self) -> &str {
        core::any::type_name::<Self>()
    }
}

struct FnHandler<F> {
    name: String,
    f: F,
}

impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&EventEnvelope) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, event: &EventEnvelope) -> Result<(), HandlerError> {
        (self.f)(event)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Outcome of dispatching one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers run.
    pub invoked: usize,
    /// Handlers that returned an error or panicked.
    pub failed: usize,
}

/// Ordered handler lists per topic.
#[derive(Default)]
pub struct ListenerRegistry {
    handlers: BTreeMap<Topic, Vec<Arc<dyn EventHandler>>>,
}

impl ListenerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a closure handler for `topic`.
    pub fn register<F>(&mut self, topic: Topic, name: impl Into<String>, f: F)
    where
        F: Fn(&EventEnvelope) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.register_handler(
            topic,
            Arc::new(FnHandler {
                name: name.into(),
                f,
            }),
        );
    }

    /// Append a shared handler for `topic`. The same handler may be
    /// registered for several topics.
    pub fn register_handler(&mut self, topic: Topic, handler: Arc<dyn EventHandler>) {
        trace!(topic = %topic, handler = handler.name(), "handler registered");
        self.handlers.entry(topic).or_default().push(handler);
    }

    /// Number of handlers registered for `topic`.
    pub fn handler_count(&self, topic: Topic) -> usize {
        self.handlers.get(&topic).map_or(0, Vec::len)
    }

    /// Topics with at least one handler.
    pub fn topics(&self) -> Vec<Topic> {
        self.handlers.keys().copied().collect()
    }

    /// Run every handler registered for the event's topic.
    pub fn dispatch(&self, event: &EventEnvelope) -> DispatchReport {
        let mut report = DispatchReport::default();
        let Some(handlers) = self.handlers.get(&event.topic()) else {
            return report;
        };
        for handler in handlers {
            report.invoked = report.invoked.saturating_add(1);
            match catch_unwind(AssertUnwindSafe(|| handler.handle(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    report.failed = report.failed.saturating_add(1);
                    warn!(
                        topic = %event.topic(),
                        key = event.key(),
                        handler = handler.name(),
                        error = %e,
                        "handler failed"
                    );
                }
                Err(panic) => {
                    report.failed = report.failed.saturating_add(1);
                    error!(
                        topic = %event.topic(),
                        key = event.key(),
                        handler = handler.name(),
                        panic = panic_message(panic.as_ref()),
                        "handler panicked"
                    );
                }
            }
        }
        report
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: BTreeMap<Topic, usize> = self
            .handlers
            .iter()
            .map(|(topic, handlers)| (*topic, handlers.len()))
            .collect();
        f.debug_struct("ListenerRegistry")
            .field("handlers", &counts)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;

    fn event(topic: Topic) -> EventEnvelope {
        EventEnvelope::new(topic, "key", "payload")
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ListenerRegistry::new();
        for name in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            registry.register(Topic::PlayerPayload, name, move |_| {
                order.lock().push(name);
                Ok(())
            });
        }
        let report = registry.dispatch(&event(Topic::PlayerPayload));
        assert_eq!(report, DispatchReport { invoked: 3, failed: 0 });
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn failures_are_isolated() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ListenerRegistry::new();
        registry.register(Topic::PlayerPayload, "erroring", |_| {
            Err(HandlerError::new("bad payload"))
        });
        registry.register(Topic::PlayerPayload, "panicking", |_| panic!("boom"));
        let counter = Arc::clone(&calls);
        registry.register(Topic::PlayerPayload, "counting", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let report = registry.dispatch(&event(Topic::PlayerPayload));
        assert_eq!(report, DispatchReport { invoked: 3, failed: 2 });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn topic_without_handlers_is_a_noop() {
        let mut registry = ListenerRegistry::new();
        registry.register(Topic::PlayerPayload, "only", |_| Ok(()));
        assert_eq!(registry.dispatch(&event(Topic::SyncRequest)), DispatchReport::default());
        assert_eq!(registry.handler_count(Topic::SyncRequest), 0);
        assert_eq!(registry.topics(), vec![Topic::PlayerPayload]);
    }

    #[test]
    fn shared_handler_serves_two_topics() {
        struct Counter(AtomicUsize);
        impl EventHandler for Counter {
            fn handle(&self, _event: &EventEnvelope) -> Result<(), HandlerError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        let mut registry = ListenerRegistry::new();
        registry.register_handler(Topic::PlayerPayload, counter.clone());
        registry.register_handler(Topic::SyncRequest, counter.clone());
        registry.dispatch(&event(Topic::PlayerPayload));
        registry.dispatch(&event(Topic::SyncRequest));
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }
}
