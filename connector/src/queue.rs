//! Bounded ingress queue between client event loops and the connector loop.

use crate::entity::Entity;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;

/// Default number of entities the queue holds.
pub const DEFAULT_CAPACITY: usize = 1000;

/// A thread-safe FIFO of parsed entities with a fixed capacity.
///
/// Producers never block: [`append`](Self::append) fails with
/// [`Error::QueueFull`] once the capacity is reached and the entity is
/// dropped. The single consumer pulls with [`drain_one`](Self::drain_one)
/// and may await [`notified`](Self::notified) between polls.
///
/// Cloning is cheap; clones share the same queue.
///
/// # Example
///
/// ```
/// use fb_mqtt_connector::{parse_message, IngressQueue};
///
/// let queue = IngressQueue::new(2);
/// let entity = parse_message("/fb/v1/dev/$state", "ready", false).unwrap();
/// queue.append(entity.clone()).unwrap();
/// queue.append(entity.clone()).unwrap();
/// assert!(queue.append(entity).is_err());
/// assert!(queue.drain_one().is_some());
/// ```
#[derive(Clone)]
pub struct IngressQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    items: Mutex<VecDeque<Entity>>,
    capacity: usize,
    notify: Notify,
}

impl IngressQueue {
    /// Creates a queue. A zero capacity falls back to [`DEFAULT_CAPACITY`].
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            DEFAULT_CAPACITY
        } else {
            capacity
        };
        Self {
            inner: Arc::new(QueueInner {
                items: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY))),
                capacity,
                notify: Notify::new(),
            }),
        }
    }

    /// Appends an entity without blocking.
    pub fn append(&self, entity: Entity) -> Result<()> {
        {
            let mut items = self.inner.items.lock();
            if items.len() >= self.inner.capacity {
                tracing::error!(
                    capacity = self.inner.capacity,
                    device = entity.device(),
                    kind = entity.kind(),
                    "ingress queue is full, entity dropped"
                );
                return Err(Error::QueueFull(self.inner.capacity));
            }
            items.push_back(entity);
        }
        self.inner.notify.notify_one();
        Ok(())
    }

    /// Removes the oldest entity.
    pub fn drain_one(&self) -> Option<Entity> {
        self.inner.items.lock().pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.items.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.items.lock().len()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Completes once an entity was appended since the last wakeup.
    pub async fn notified(&self) {
        self.inner.notify.notified().await;
    }
}

impl Default for IngressQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for IngressQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngressQueue")
            .field("len", &self.len())
            .field("capacity", &self.inner.capacity)
            .finish()
    }
}
