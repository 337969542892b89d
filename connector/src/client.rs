//! Broker clients.
//!
//! [`Client`] is what the pool needs from one logical broker connection.
//! [`MqttClient`] implements it on top of rumqttc:
//! - every `connect` builds a fresh event loop and waits for CONNACK
//! - the event loop then runs on its own task and reports to [`Handler`]s
//! - a lost connection leaves the client `Disconnected`; reconnecting is the
//!   pool's job

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::handler::{Handler, Message, Session};
use crate::registry::SubscriptionRegistry;
use crate::types::{ClientState, QoS};
use async_trait::async_trait;
use parking_lot::Mutex;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Level};
use uuid::Uuid;

/// Capacity of the request channel between the client handle and its event loop.
const REQUEST_CAPACITY: usize = 100;

/// How long a local disconnect waits for the event loop to flush DISCONNECT.
const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

/// One logical broker connection as seen by the pool.
#[async_trait]
pub trait Client: Send + Sync {
    fn id(&self) -> Uuid;

    fn is_enabled(&self) -> bool;

    fn enable(&self);

    /// Marks the client disabled. The caller disconnects it.
    fn disable(&self);

    fn state(&self) -> ClientState;

    fn is_connected(&self) -> bool {
        self.state() == ClientState::Connected
    }

    /// Makes one connection attempt.
    async fn connect(&self) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS, retain: bool) -> Result<()>;
}

/// rumqttc backed [`Client`].
#[derive(Clone)]
pub struct MqttClient {
    inner: Arc<Inner>,
}

struct Inner {
    id: Uuid,
    options: MqttOptions,
    connect_timeout: Duration,
    handler: Arc<dyn Handler>,
    registry: SubscriptionRegistry,
    enabled: AtomicBool,
    state: Mutex<ClientState>,
    generation: AtomicU64,
    link: Mutex<Option<Link>>,
    pending: Mutex<Pending>,
}

/// Live connection: request handle plus the task polling its event loop.
struct Link {
    client: AsyncClient,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Requests queued to rumqttc whose packet id is not known yet.
#[derive(Default)]
struct Pending {
    subscribe: VecDeque<(String, QoS)>,
    unsubscribe: VecDeque<String>,
    unsubscribing: HashMap<u16, String>,
}

impl MqttClient {
    pub fn new(
        id: Uuid,
        options: MqttOptions,
        connect_timeout: Duration,
        handler: Arc<dyn Handler>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                id,
                options,
                connect_timeout,
                handler,
                registry: SubscriptionRegistry::new(),
                enabled: AtomicBool::new(true),
                state: Mutex::new(ClientState::Disconnected),
                generation: AtomicU64::new(0),
                link: Mutex::new(None),
                pending: Mutex::new(Pending::default()),
            }),
        }
    }

    /// Builds a client from its configuration.
    pub fn from_config(
        config: &ClientConfig,
        connect_timeout: Duration,
        handler: Arc<dyn Handler>,
    ) -> Result<Self> {
        let client = Self::new(config.id, config.mqtt_options()?, connect_timeout, handler);
        client.inner.enabled.store(config.enabled, Ordering::SeqCst);
        Ok(client)
    }

    /// Subscriptions acknowledged or pending on the current connection.
    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.inner.registry
    }

    /// Queues a SUBSCRIBE on the live connection.
    pub fn subscribe(&self, topic: &str, qos: QoS) -> Result<()> {
        self.inner.subscribe(topic, qos)
    }

    /// Queues an UNSUBSCRIBE on the live connection.
    pub fn unsubscribe(&self, topic: &str) -> Result<()> {
        self.inner.unsubscribe(topic)
    }
}

impl Inner {
    fn set_state(&self, state: ClientState) {
        *self.state.lock() = state;
    }

    fn request_handle(&self) -> Result<AsyncClient> {
        self.link
            .lock()
            .as_ref()
            .map(|link| link.client.clone())
            .ok_or_else(|| Error::Connection("client is not connected".into()))
    }

    /// Tears down the current link, if any, without waiting for it.
    fn drop_link(&self) {
        if let Some(link) = self.link.lock().take() {
            link.cancel.cancel();
        }
    }

    /// Polls until CONNACK or failure.
    async fn handshake(&self, event_loop: &mut EventLoop) -> Result<()> {
        loop {
            match event_loop.poll().await? {
                Event::Incoming(Packet::ConnAck(ack)) => {
                    return match ack.code {
                        ConnectReturnCode::Success => Ok(()),
                        code => Err(Error::ConnectionRefused(format!("{code:?}"))),
                    };
                }
                event => debug!(client_id = %self.id, ?event, "event before CONNACK"),
            }
        }
    }

    async fn run(self: Arc<Self>, mut event_loop: EventLoop, cancel: CancellationToken, generation: u64) {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = event_loop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    debug!(client_id = %self.id, topic = %publish.topic, "message received");
                    let message = Message {
                        topic: publish.topic.clone(),
                        payload: publish.payload.clone(),
                        qos: publish.qos.into(),
                        retain: publish.retain,
                        packet_id: (publish.pkid != 0).then_some(publish.pkid),
                    };
                    // Fan-out logs handler errors.
                    let _ = self.handler.on_message(&*self, &message);
                }
                Ok(Event::Outgoing(Outgoing::Subscribe(pkid))) => {
                    if let Some((topic, qos)) = self.pending.lock().subscribe.pop_front() {
                        self.registry.create(topic, qos, pkid);
                    }
                }
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    self.handler.on_subscribe(&*self, ack.pkid);
                }
                Ok(Event::Outgoing(Outgoing::Unsubscribe(pkid))) => {
                    let mut pending = self.pending.lock();
                    if let Some(topic) = pending.unsubscribe.pop_front() {
                        pending.unsubscribing.insert(pkid, topic);
                    }
                }
                Ok(Event::Incoming(Packet::UnsubAck(ack))) => {
                    let topic = self.pending.lock().unsubscribing.remove(&ack.pkid);
                    if let Some(topic) = topic {
                        self.handler.on_unsubscribe(&*self, ack.pkid, &topic);
                    }
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    self.handler.on_log(&*self, Level::WARN, "broker closed the connection");
                    break;
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!(client_id = %self.id, error = %e, "connection lost");
                    self.handler.on_log(&*self, Level::ERROR, &e.to_string());
                    break;
                }
            }
        }

        // A newer connection owns the state.
        if self.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        self.set_state(ClientState::Disconnected);
        self.registry.clear();
        *self.pending.lock() = Pending::default();
        self.handler.on_disconnect(&*self);
    }
}

impl Session for Inner {
    fn client_id(&self) -> Uuid {
        self.id
    }

    fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    fn subscribe(&self, topic: &str, qos: QoS) -> Result<()> {
        let client = self.request_handle()?;
        let mut pending = self.pending.lock();
        client
            .try_subscribe(topic, qos.into())
            .map_err(|e| Error::Subscribe(e.to_string()))?;
        pending.subscribe.push_back((topic.to_string(), qos));
        Ok(())
    }

    fn unsubscribe(&self, topic: &str) -> Result<()> {
        let client = self.request_handle()?;
        let mut pending = self.pending.lock();
        client
            .try_unsubscribe(topic)
            .map_err(|e| Error::Subscribe(e.to_string()))?;
        pending.unsubscribe.push_back(topic.to_string());
        Ok(())
    }
}

#[async_trait]
impl Client for MqttClient {
    fn id(&self) -> Uuid {
        self.inner.id
    }

    fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    fn enable(&self) {
        self.inner.enabled.store(true, Ordering::SeqCst);
    }

    fn disable(&self) {
        self.inner.enabled.store(false, Ordering::SeqCst);
    }

    fn state(&self) -> ClientState {
        if !self.is_enabled() {
            return ClientState::Disabled;
        }
        *self.inner.state.lock()
    }

    async fn connect(&self) -> Result<()> {
        let inner = &self.inner;
        if !self.is_enabled() {
            return Err(Error::InvalidState(format!("client {} is disabled", inner.id)));
        }

        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        inner.drop_link();
        inner.set_state(ClientState::Connecting);

        let (host, port) = inner.options.broker_address();
        info!(client_id = %inner.id, %host, port, "connecting to MQTT broker");

        let (client, mut event_loop) = AsyncClient::new(inner.options.clone(), REQUEST_CAPACITY);
        let handshake = tokio::time::timeout(inner.connect_timeout, inner.handshake(&mut event_loop)).await;
        let result = match handshake {
            Ok(result) => result,
            Err(_) => Err(Error::Connection(format!(
                "no CONNACK within {:?}",
                inner.connect_timeout
            ))),
        };
        if let Err(e) = result {
            inner.set_state(ClientState::Disconnected);
            return Err(e);
        }

        {
            // A disconnect during the handshake found no link to tear down.
            let mut link = inner.link.lock();
            if !self.is_enabled() {
                drop(event_loop);
                inner.set_state(ClientState::Disconnected);
                return Err(Error::InvalidState(format!(
                    "client {} was disabled while connecting",
                    inner.id
                )));
            }

            *inner.pending.lock() = Pending::default();
            inner.registry.clear();
            inner.set_state(ClientState::Connected);
            let cancel = CancellationToken::new();
            let task = tokio::spawn(inner.clone().run(event_loop, cancel.clone(), generation));
            *link = Some(Link {
                client,
                cancel,
                task,
            });
        }
        info!(client_id = %inner.id, "connected to MQTT broker");

        if let Err(e) = inner.handler.on_connect(&**inner) {
            warn!(client_id = %inner.id, error = %e, "connect handlers failed");
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let link = self.inner.link.lock().take();
        let Some(mut link) = link else {
            self.inner.set_state(ClientState::Disconnected);
            return Ok(());
        };

        if link.client.try_disconnect().is_ok()
            && tokio::time::timeout(DISCONNECT_GRACE, &mut link.task).await.is_ok()
        {
            return Ok(());
        }

        link.cancel.cancel();
        let _ = link.task.await;
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS, retain: bool) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::Publish(format!("client {} is not connected", self.inner.id)));
        }
        let client = self.inner.request_handle()?;
        client
            .publish(topic, qos.into(), retain, payload.to_vec())
            .await
            .map_err(|e| Error::Publish(e.to_string()))
    }
}

impl std::fmt::Debug for MqttClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttClient")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .finish()
    }
}
