//! Topic-keyed event listeners with delivery through the worker pool.
//!
//! Each delivery of an [`Event`] to an [`EventListener`] becomes its own
//! task. A failing or panicking listener is contained exactly like any
//! other task failure and never affects the publisher or other listeners.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::{AppResult, EngineError, EngineResult, TaskFailure};
use super::executor::TaskExecutor;
use super::task::{Task, TaskRef};
use super::worker_pool::WorkerPool;
use crate::util::clock::now_ms;

/// Topic that receives every published event.
pub const WILDCARD_TOPIC: &str = "*";

/// A published event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    topic: String,
    payload: Value,
    source: Option<String>,
    timestamp_ms: u128,
}

impl Event {
    /// Event on `topic` stamped with the current wall-clock time.
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            payload,
            source: None,
            timestamp_ms: now_ms(),
        }
    }

    /// Label the component that raised the event.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Event topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// JSON payload.
    #[must_use]
    pub const fn payload(&self) -> &Value {
        &self.payload
    }

    /// Source label, if any.
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Milliseconds since the Unix epoch at creation.
    #[must_use]
    pub const fn timestamp_ms(&self) -> u128 {
        self.timestamp_ms
    }
}

/// Receiver of published events.
pub trait EventListener: Send + Sync + 'static {
    /// Handle one event. Errors are recorded on the delivery task.
    fn on_event(&self, event: &Event) -> AppResult<()>;
}

impl<F> EventListener for F
where
    F: Fn(&Event) -> AppResult<()> + Send + Sync + 'static,
{
    fn on_event(&self, event: &Event) -> AppResult<()> {
        self(event)
    }
}

/// Identifies a subscription for [`EventManager::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ListenerId(u64);

struct Delivery {
    listener: Arc<dyn EventListener>,
    event: Arc<Event>,
}

impl TaskExecutor for Delivery {
    fn execute_task(&self, _task: &Task) -> AppResult<()> {
        self.listener.on_event(&self.event)
    }
}

/// Serializable snapshot of an event manager.
#[derive(Debug, Clone, Serialize)]
pub struct EventManagerProperties {
    /// Manager instance identifier.
    pub instance_id: Uuid,
    /// Number of topics with at least one listener.
    pub topics: usize,
    /// Number of registered listeners.
    pub listeners: usize,
    /// Events ever published.
    pub published: u64,
    /// Deliveries ever issued.
    pub deliveries: u64,
    /// Pool carrying deliveries, if any.
    pub bound_pool: Option<Uuid>,
    /// Whether the manager accepts events.
    pub live: bool,
}

type ListenerMap = HashMap<String, Vec<(ListenerId, Arc<dyn EventListener>)>>;

/// Registry of listeners keyed by topic.
pub struct EventManager {
    id: Uuid,
    listeners: RwLock<ListenerMap>,
    next_id: AtomicU64,
    pool: Option<Arc<WorkerPool>>,
    live: AtomicBool,
    published: AtomicU64,
    deliveries: AtomicU64,
}

impl EventManager {
    /// Manager that delivers on the publishing thread.
    #[must_use]
    pub fn inline() -> Self {
        Self::build(None)
    }

    /// Manager that submits each delivery to `pool`.
    #[must_use]
    pub fn with_pool(pool: Arc<WorkerPool>) -> Self {
        Self::build(Some(pool))
    }

    fn build(pool: Option<Arc<WorkerPool>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            listeners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            pool,
            live: AtomicBool::new(true),
            published: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
        }
    }

    /// Manager instance identifier.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Register `listener` for `topic`; [`WILDCARD_TOPIC`] matches all.
    ///
    /// # Errors
    ///
    /// `EngineError::Closed` once the manager has been closed.
    pub fn subscribe<L: EventListener>(&self, topic: &str, listener: L) -> EngineResult<ListenerId> {
        self.subscribe_shared(topic, Arc::new(listener))
    }

    /// Register an already shared listener.
    ///
    /// # Errors
    ///
    /// `EngineError::Closed` once the manager has been closed.
    pub fn subscribe_shared(
        &self,
        topic: &str,
        listener: Arc<dyn EventListener>,
    ) -> EngineResult<ListenerId> {
        let mut listeners = self.listeners.write();
        if !self.is_live() {
            return Err(EngineError::Closed("event manager"));
        }
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        listeners
            .entry(topic.to_string())
            .or_default()
            .push((id, listener));
        debug!(topic, listener_id = id.0, "Listener subscribed");
        Ok(id)
    }

    /// Remove a subscription. Returns `false` if it was unknown.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let mut removed = false;
        listeners.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|(entry_id, _)| *entry_id != id);
            removed |= entries.len() != before;
            !entries.is_empty()
        });
        removed
    }

    /// Listeners registered for exactly `topic`.
    #[must_use]
    pub fn listener_count(&self, topic: &str) -> usize {
        self.listeners.read().get(topic).map_or(0, Vec::len)
    }

    /// Deliver `event` to its topic's listeners and the wildcard listeners.
    ///
    /// Returns one delivery task per listener. With a bound pool they may
    /// still be pending; inline deliveries have completed. A delivery the
    /// pool refuses is settled as discarded and the rest still go out.
    ///
    /// # Errors
    ///
    /// `EngineError::Closed` if the manager has been closed.
    pub fn publish(&self, event: Event) -> EngineResult<Vec<TaskRef>> {
        if !self.is_live() {
            return Err(EngineError::Closed("event manager"));
        }

        let event = Arc::new(event);
        let targets: Vec<Arc<dyn EventListener>> = {
            let listeners = self.listeners.read();
            let exact = listeners.get(event.topic()).into_iter().flatten();
            let wildcard = if event.topic() == WILDCARD_TOPIC {
                None
            } else {
                listeners.get(WILDCARD_TOPIC)
            };
            exact
                .chain(wildcard.into_iter().flatten())
                .map(|(_, listener)| Arc::clone(listener))
                .collect()
        };
        self.published.fetch_add(1, Ordering::Relaxed);

        let mut tasks = Vec::with_capacity(targets.len());
        for listener in targets {
            let task = Task::builder(Delivery {
                listener,
                event: Arc::clone(&event),
            })
            .with_reference(event.topic())
            .build();
            if let Err(err) = self.deliver(Arc::clone(&task)) {
                warn!(topic = event.topic(), task_id = task.id(), error = %err, "Event delivery rejected");
                task.abandon(TaskFailure::discarded("event delivery pool"));
            }
            tasks.push(task);
        }

        debug!(topic = event.topic(), deliveries = tasks.len(), "Event published");
        Ok(tasks)
    }

    fn deliver(&self, task: TaskRef) -> EngineResult<()> {
        self.deliveries.fetch_add(1, Ordering::Relaxed);
        match &self.pool {
            Some(pool) => pool.submit(task),
            None => {
                if !task.run() {
                    warn!(task_id = task.id(), "Inline event delivery failed");
                }
                Ok(())
            }
        }
    }

    /// Whether the manager accepts events.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Drop every listener and reject further use. Idempotent.
    pub fn close(&self) {
        if !self.live.swap(false, Ordering::AcqRel) {
            return;
        }
        let mut listeners = self.listeners.write();
        let dropped: usize = listeners.values().map(Vec::len).sum();
        listeners.clear();
        info!(manager_id = %self.id, dropped, "Event manager closed");
    }

    /// Serializable snapshot for telemetry.
    #[must_use]
    pub fn properties(&self) -> EventManagerProperties {
        let listeners = self.listeners.read();
        EventManagerProperties {
            instance_id: self.id,
            topics: listeners.len(),
            listeners: listeners.values().map(Vec::len).sum(),
            published: self.published.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            bound_pool: self.pool.as_ref().map(|pool| pool.id()),
            live: self.is_live(),
        }
    }
}

impl fmt::Debug for EventManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventManager")
            .field("id", &self.id)
            .field("topics", &self.listeners.read().len())
            .field("live", &self.is_live())
            .finish()
    }
}
