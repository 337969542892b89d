//! Pool of logical broker clients.

use crate::client::Client;
use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::types::{ClientState, QoS};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

struct Entry {
    client: Arc<dyn Client>,
    /// Set while a reconnect task runs for this client.
    retrying: Arc<AtomicBool>,
    /// Cancelled when the client leaves the pool.
    cancel: CancellationToken,
}

/// Owns the broker clients and keeps enabled ones connected.
///
/// Clients are kept in registration order. Each enabled but disconnected
/// client gets at most one reconnect task, which retries until the client
/// is connected, disabled, removed, or the pool is shut down:
/// - after an attempt that did not connect it sleeps `connect_delay`
/// - after the broker refused the connection it sleeps `refused_delay`
pub struct ClientPool {
    entries: RwLock<Vec<Entry>>,
    retry: RetryConfig,
    shutdown: CancellationToken,
}

impl ClientPool {
    pub fn new(retry: RetryConfig) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            retry,
            shutdown: CancellationToken::new(),
        }
    }

    /// Adds a client. A client with the same id is rejected.
    pub fn register(&self, client: Arc<dyn Client>) -> Result<()> {
        let mut entries = self.entries.write();
        if entries.iter().any(|e| e.client.id() == client.id()) {
            return Err(Error::Validation(format!("client {} is already registered", client.id())));
        }
        debug!(client_id = %client.id(), "client registered");
        entries.push(Entry {
            client,
            retrying: Arc::new(AtomicBool::new(false)),
            cancel: self.shutdown.child_token(),
        });
        Ok(())
    }

    /// Disconnects a client and drops it from the pool.
    pub async fn remove(&self, id: Uuid) -> Result<()> {
        let entry = {
            let mut entries = self.entries.write();
            let index = entries
                .iter()
                .position(|e| e.client.id() == id)
                .ok_or(Error::ClientNotFound(id))?;
            entries.remove(index)
        };
        entry.cancel.cancel();
        entry.client.disconnect().await
    }

    /// Disconnects and drops every client.
    pub async fn reset(&self) {
        let entries = std::mem::take(&mut *self.entries.write());
        for entry in entries {
            entry.cancel.cancel();
            if let Err(e) = entry.client.disconnect().await {
                warn!(client_id = %entry.client.id(), error = %e, "disconnect failed");
            }
        }
    }

    pub fn client_ids(&self) -> Vec<Uuid> {
        self.entries.read().iter().map(|e| e.client.id()).collect()
    }

    pub fn client(&self, id: Uuid) -> Option<Arc<dyn Client>> {
        self.entries
            .read()
            .iter()
            .find(|e| e.client.id() == id)
            .map(|e| e.client.clone())
    }

    pub fn state(&self, id: Uuid) -> Option<ClientState> {
        self.client(id).map(|c| c.state())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn select(&self, id: Option<Uuid>) -> Result<Vec<Arc<dyn Client>>> {
        let entries = self.entries.read();
        match id {
            None => Ok(entries.iter().map(|e| e.client.clone()).collect()),
            Some(id) => entries
                .iter()
                .find(|e| e.client.id() == id)
                .map(|e| vec![e.client.clone()])
                .ok_or(Error::ClientNotFound(id)),
        }
    }

    /// Enables one client, or all of them, and starts connecting.
    pub fn enable(&self, id: Option<Uuid>) -> Result<()> {
        for client in self.select(id)? {
            client.enable();
            info!(client_id = %client.id(), "client enabled");
        }
        self.connect();
        Ok(())
    }

    /// Disables one client, or all of them, and disconnects it.
    pub async fn disable(&self, id: Option<Uuid>) -> Result<()> {
        for client in self.select(id)? {
            client.disable();
            info!(client_id = %client.id(), "client disabled");
            if let Err(e) = client.disconnect().await {
                warn!(client_id = %client.id(), error = %e, "disconnect failed");
            }
        }
        Ok(())
    }

    /// Starts a reconnect task for every enabled client that is not connected.
    pub fn connect(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        for entry in self.entries.read().iter() {
            if !entry.client.is_enabled() || entry.client.is_connected() {
                continue;
            }
            if entry.retrying.swap(true, Ordering::AcqRel) {
                continue;
            }

            let client = entry.client.clone();
            let retrying = entry.retrying.clone();
            let cancel = entry.cancel.clone();
            let retry = self.retry.clone();
            tokio::spawn(async move {
                reconnect(client, retry, cancel).await;
                retrying.store(false, Ordering::Release);
            });
        }
    }

    /// Re-triggers connecting for enabled clients that dropped.
    pub fn check_connection(&self) {
        self.connect();
    }

    /// Whether a reconnect task is running for the client.
    pub fn is_retrying(&self, id: Uuid) -> bool {
        self.entries
            .read()
            .iter()
            .any(|e| e.client.id() == id && e.retrying.load(Ordering::Acquire))
    }

    /// Disconnects every client, keeping them registered.
    pub async fn disconnect(&self) {
        let clients: Vec<_> = self.entries.read().iter().map(|e| e.client.clone()).collect();
        for client in clients {
            if let Err(e) = client.disconnect().await {
                warn!(client_id = %client.id(), error = %e, "disconnect failed");
            }
        }
    }

    /// Stops every reconnect task. The pool does not reconnect afterwards.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Publishes through every enabled client, or only through `clients`.
    ///
    /// Succeeds when every selected client published. Fails with
    /// [`Error::ClientNotFound`] when a requested id is unknown, and with
    /// [`Error::Publish`] when no client was selected or any publish failed.
    pub async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        clients: Option<&[Uuid]>,
    ) -> Result<()> {
        let targets: Vec<Arc<dyn Client>> = {
            let entries = self.entries.read();
            if let Some(ids) = clients {
                if let Some(missing) = ids.iter().find(|id| !entries.iter().any(|e| e.client.id() == **id)) {
                    return Err(Error::ClientNotFound(*missing));
                }
            }
            entries
                .iter()
                .filter(|e| e.client.is_enabled())
                .filter(|e| clients.is_none_or(|ids| ids.contains(&e.client.id())))
                .map(|e| e.client.clone())
                .collect()
        };

        if targets.is_empty() {
            return Err(Error::Publish(format!("no enabled client to publish {topic}")));
        }

        let mut failed = 0;
        for client in &targets {
            if let Err(e) = client.publish(topic, payload, qos, false).await {
                warn!(client_id = %client.id(), topic, error = %e, "publish failed");
                failed += 1;
            }
        }

        if failed > 0 {
            return Err(Error::Publish(format!(
                "{failed} of {} clients failed to publish {topic}",
                targets.len()
            )));
        }
        Ok(())
    }
}

impl Drop for ClientPool {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for ClientPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientPool")
            .field("clients", &self.client_ids())
            .finish()
    }
}

async fn reconnect(client: Arc<dyn Client>, retry: RetryConfig, cancel: CancellationToken) {
    loop {
        if cancel.is_cancelled() || !client.is_enabled() || client.is_connected() {
            return;
        }

        let attempt = tokio::select! {
            _ = cancel.cancelled() => return,
            attempt = client.connect() => attempt,
        };
        if !client.is_enabled() {
            return;
        }

        let delay = match attempt {
            Ok(()) if client.is_connected() => return,
            Ok(()) => retry.connect_delay(),
            Err(e) if e.is_refused() => {
                warn!(client_id = %client.id(), error = %e, "connection refused, retrying later");
                retry.refused_delay()
            }
            Err(e) => {
                warn!(client_id = %client.id(), error = %e, "connection failed, retrying");
                retry.connect_delay()
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeClient;
    use super::*;
    use std::time::Duration;

    fn retry() -> RetryConfig {
        RetryConfig {
            connect_delay_ms: 1000,
            refused_delay_ms: 10_000,
            connect_timeout_ms: 100,
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_connect_enabled_clients() {
        let pool = ClientPool::new(retry());
        let on = FakeClient::new();
        let off = FakeClient::new();
        off.disable();
        pool.register(on.clone()).unwrap();
        pool.register(off.clone()).unwrap();

        pool.connect();
        settle().await;

        assert_eq!(pool.state(on.id), Some(ClientState::Connected));
        assert_eq!(pool.state(off.id), Some(ClientState::Disabled));
        assert_eq!(off.attempts(), 0);
        assert_eq!(pool.client_ids(), vec![on.id, off.id]);
    }

    #[tokio::test]
    async fn test_duplicate_and_missing_clients() {
        let pool = ClientPool::new(retry());
        let client = FakeClient::new();
        pool.register(client.clone()).unwrap();
        assert!(pool.register(client.clone()).is_err());

        let unknown = Uuid::new_v4();
        assert!(matches!(pool.enable(Some(unknown)), Err(Error::ClientNotFound(_))));
        assert!(matches!(pool.remove(unknown).await, Err(Error::ClientNotFound(_))));
        pool.remove(client.id).await.unwrap();
        assert!(pool.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_delays() {
        let pool = ClientPool::new(retry());
        let client = FakeClient::new();
        client.fail.store(true, Ordering::SeqCst);
        pool.register(client.clone()).unwrap();

        pool.connect();
        settle().await;
        assert_eq!(client.attempts(), 1);
        assert!(pool.is_retrying(client.id));

        // A second trigger does not start another retry loop.
        pool.check_connection();
        settle().await;
        assert_eq!(client.attempts(), 1);

        tokio::time::advance(Duration::from_millis(1001)).await;
        settle().await;
        assert_eq!(client.attempts(), 2);

        client.fail.store(false, Ordering::SeqCst);
        client.refuse.store(true, Ordering::SeqCst);
        tokio::time::advance(Duration::from_millis(1001)).await;
        settle().await;
        assert_eq!(client.attempts(), 3);

        client.refuse.store(false, Ordering::SeqCst);
        tokio::time::advance(Duration::from_millis(5000)).await;
        settle().await;
        assert_eq!(client.attempts(), 3);

        tokio::time::advance(Duration::from_millis(5001)).await;
        settle().await;
        assert_eq!(client.attempts(), 4);
        assert!(client.is_connected());
        assert!(!pool.is_retrying(client.id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_stops_retrying() {
        let pool = ClientPool::new(retry());
        let client = FakeClient::new();
        client.fail.store(true, Ordering::SeqCst);
        pool.register(client.clone()).unwrap();

        pool.connect();
        settle().await;
        pool.disable(Some(client.id)).await.unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;
        settle().await;

        assert_eq!(client.attempts(), 1);
        assert_eq!(pool.state(client.id), Some(ClientState::Disabled));
        assert!(!pool.is_retrying(client.id));

        client.fail.store(false, Ordering::SeqCst);
        pool.enable(Some(client.id)).unwrap();
        settle().await;
        assert_eq!(pool.state(client.id), Some(ClientState::Connected));
    }

    #[tokio::test]
    async fn test_publish_outcome() {
        let pool = ClientPool::new(retry());
        let a = FakeClient::new();
        let b = FakeClient::new();
        pool.register(a.clone()).unwrap();
        pool.register(b.clone()).unwrap();

        assert!(matches!(
            pool.publish("/t/set", b"1", QoS::AtLeastOnce, None).await,
            Err(Error::Publish(_))
        ));

        pool.connect();
        settle().await;
        pool.publish("/t/set", b"1", QoS::AtLeastOnce, None).await.unwrap();
        assert_eq!(a.published.lock().len(), 1);
        assert_eq!(b.published.lock().len(), 1);

        pool.publish("/t/set", b"2", QoS::AtLeastOnce, Some(&[b.id])).await.unwrap();
        assert_eq!(a.published.lock().len(), 1);
        assert_eq!(b.published.lock().len(), 2);

        a.fail_publish.store(true, Ordering::SeqCst);
        assert!(pool.publish("/t/set", b"3", QoS::AtLeastOnce, None).await.is_err());
        assert!(matches!(
            pool.publish("/t/set", b"4", QoS::AtLeastOnce, Some(&[Uuid::new_v4()])).await,
            Err(Error::ClientNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reset_and_shutdown() {
        let pool = ClientPool::new(retry());
        let client = FakeClient::new();
        pool.register(client.clone()).unwrap();
        pool.connect();
        settle().await;
        assert!(client.is_connected());

        pool.reset().await;
        assert!(pool.is_empty());
        assert!(!client.is_connected());

        let late = FakeClient::new();
        pool.register(late.clone()).unwrap();
        pool.shutdown();
        pool.connect();
        settle().await;
        assert_eq!(late.attempts(), 0);
    }
}
