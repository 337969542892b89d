//! Connector loop: keeps clients connected and drains the ingress queue.

use crate::client::MqttClient;
use crate::config::ConnectorConfig;
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::handler::{ApiV1Handler, CommonHandler, Handlers};
use crate::pool::ClientPool;
use crate::publisher::ApiV1Publisher;
use crate::queue::IngressQueue;
use parking_lot::{Mutex, RwLock};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Receiver of drained entities.
///
/// Every registered consumer sees every entity, in registration order.
pub trait Consumer: Send + Sync {
    fn consume(&self, entity: &Entity) -> Result<()>;
}

impl<F> Consumer for F
where
    F: Fn(&Entity) -> Result<()> + Send + Sync,
{
    fn consume(&self, entity: &Entity) -> Result<()> {
        self(entity)
    }
}

/// Bridges the broker clients to the registered consumers.
///
/// Cloning is cheap; clones control the same connector.
///
/// # Example
///
/// ```no_run
/// use fb_mqtt_connector::{Connector, ConnectorConfig, Entity};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = ConnectorConfig::from_file("fbmqtt.yaml")?;
///     let connector = Connector::from_config(&config)?;
///     connector.register_consumer(std::sync::Arc::new(|entity: &Entity| {
///         println!("{}", serde_json::to_string(entity).unwrap_or_default());
///         Ok(())
///     }));
///
///     connector.start()?;
///     tokio::signal::ctrl_c().await?;
///     connector.stop();
///     connector.wait().await;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Connector {
    inner: Arc<Inner>,
}

struct Inner {
    pool: Arc<ClientPool>,
    queue: IngressQueue,
    handlers: Arc<Handlers>,
    consumers: RwLock<Vec<Arc<dyn Consumer>>>,
    check_interval: Duration,
    stop: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Connector {
    pub fn new(
        pool: ClientPool,
        queue: IngressQueue,
        handlers: Arc<Handlers>,
        check_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                pool: Arc::new(pool),
                queue,
                handlers,
                consumers: RwLock::new(Vec::new()),
                check_interval,
                stop: CancellationToken::new(),
                task: Mutex::new(None),
            }),
        }
    }

    /// Builds the queue, the v1 and common handlers and one [`MqttClient`]
    /// per configured client.
    pub fn from_config(config: &ConnectorConfig) -> Result<Self> {
        config.validate()?;

        let queue = IngressQueue::new(config.queue_capacity);
        let handlers = Arc::new(Handlers::new());
        handlers.register(Arc::new(ApiV1Handler::new(queue.clone())));
        handlers.register(Arc::new(CommonHandler::new(
            queue.clone(),
            config.sys_log.clone(),
        )));

        let pool = ClientPool::new(config.retry.clone());
        for client in &config.clients {
            let client = MqttClient::from_config(client, config.retry.connect_timeout(), handlers.clone())?;
            pool.register(Arc::new(client))?;
        }

        Ok(Self::new(pool, queue, handlers, config.check_interval()))
    }

    pub fn pool(&self) -> &Arc<ClientPool> {
        &self.inner.pool
    }

    pub fn queue(&self) -> &IngressQueue {
        &self.inner.queue
    }

    pub fn handlers(&self) -> &Arc<Handlers> {
        &self.inner.handlers
    }

    /// Publisher writing through this connector's clients.
    pub fn publisher(&self) -> ApiV1Publisher {
        ApiV1Publisher::new(self.inner.pool.clone())
    }

    pub fn register_consumer(&self, consumer: Arc<dyn Consumer>) {
        self.inner.consumers.write().push(consumer);
    }

    /// Connects the clients and spawns the loop.
    pub fn start(&self) -> Result<()> {
        if self.inner.stop.is_cancelled() {
            return Err(Error::InvalidState("connector was stopped".into()));
        }
        let mut task = self.inner.task.lock();
        if task.is_some() {
            return Err(Error::InvalidState("connector is already running".into()));
        }
        info!(clients = self.inner.pool.len(), "starting connector");
        *task = Some(tokio::spawn(self.inner.clone().run()));
        Ok(())
    }

    /// Requests shutdown. Queued entities are still drained, then every
    /// client is disconnected.
    pub fn stop(&self) {
        info!("stopping connector");
        self.inner.stop.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Waits until the loop has terminated.
    pub async fn wait(&self) {
        let task = self.inner.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(error = %e, "connector loop panicked");
            }
        }
    }
}

impl Inner {
    async fn run(self: Arc<Self>) {
        self.pool.connect();

        loop {
            if let Some(entity) = self.queue.drain_one() {
                self.dispatch(&entity);
                self.pool.check_connection();
                tokio::task::yield_now().await;
                continue;
            }

            if self.stop.is_cancelled() {
                break;
            }

            self.pool.check_connection();
            tokio::select! {
                _ = self.queue.notified() => {}
                _ = self.stop.cancelled() => {}
                _ = tokio::time::sleep(self.check_interval) => {}
            }
        }

        self.pool.shutdown();
        self.pool.disconnect().await;
        info!("connector stopped");
    }

    fn dispatch(&self, entity: &Entity) {
        debug!(kind = entity.kind(), device = entity.device(), "dispatching entity");
        let consumers = self.consumers.read().clone();
        for consumer in consumers {
            match panic::catch_unwind(AssertUnwindSafe(|| consumer.consume(entity))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(kind = entity.kind(), device = entity.device(), error = %e, "consumer failed");
                }
                Err(_) => {
                    error!(kind = entity.kind(), device = entity.device(), "consumer panicked");
                }
            }
        }
    }
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("pool", &self.inner.pool)
            .field("queue", &self.inner.queue)
            .field("consumers", &self.inner.consumers.read().len())
            .finish()
    }
}
