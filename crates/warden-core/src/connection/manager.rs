//! Pool of live remote-shell connections keyed by session id.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::transport::{
    ConnectionConfig, RemoteShell, ShellChannel, ShellConnector, TerminalSize,
};
use crate::error::{ConnectionError, ConnectionResult};

/// Summary of a pooled connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub session_id: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub connected_at: DateTime<Utc>,
    /// Current terminal geometry, once a shell is open
    pub shell_size: Option<TerminalSize>,
}

struct PooledConnection {
    /// Distinguishes this connection from a later one reusing the session id
    generation: u64,
    info: ConnectionInfo,
    shell: Arc<Mutex<Box<dyn RemoteShell>>>,
}

pub struct ConnectionManager {
    connector: Arc<dyn ShellConnector>,
    pool: Arc<DashMap<String, PooledConnection>>,
    next_generation: AtomicU64,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn ShellConnector>) -> Self {
        Self {
            connector,
            pool: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Connect and pool the connection under `session_id`.
    ///
    /// Resolves once the remote end is ready. Fails with
    /// [`ConnectionError::Timeout`] when `config.connect_timeout` elapses;
    /// failures are never retried here.
    pub async fn create_connection(
        &self,
        session_id: &str,
        config: &ConnectionConfig,
    ) -> ConnectionResult<ConnectionInfo> {
        if self.pool.contains_key(session_id) {
            return Err(ConnectionError::AlreadyConnected(session_id.to_string()));
        }

        debug!(session_id, host = %config.host, port = config.port, "Connecting");
        let connected = tokio::time::timeout(
            config.connect_timeout,
            self.connector.connect(session_id, config),
        )
        .await
        .map_err(|_| ConnectionError::Timeout {
            secs: config.connect_timeout.as_secs(),
        })??;

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let info = ConnectionInfo {
            session_id: session_id.to_string(),
            host: config.host.clone(),
            port: config.port,
            username: config.username.clone(),
            connected_at: Utc::now(),
            shell_size: None,
        };

        let duplicate = match self.pool.entry(session_id.to_string()) {
            Entry::Occupied(_) => Some(connected.shell),
            Entry::Vacant(slot) => {
                slot.insert(PooledConnection {
                    generation,
                    info: info.clone(),
                    shell: Arc::new(Mutex::new(connected.shell)),
                });
                None
            }
        };

        // Lost a race with another create for the same session.
        if let Some(mut shell) = duplicate {
            if let Err(e) = shell.close().await {
                warn!(session_id, error = %e, "Failed to close duplicate connection");
            }
            return Err(ConnectionError::AlreadyConnected(session_id.to_string()));
        }

        self.watch_remote_close(session_id.to_string(), generation, connected.closed);

        info!(session_id, host = %info.host, "Connection established");
        Ok(info)
    }

    /// Drop the pool entry when the remote end disconnects on its own.
    fn watch_remote_close(
        &self,
        session_id: String,
        generation: u64,
        closed: tokio::sync::oneshot::Receiver<()>,
    ) {
        let pool = self.pool.clone();
        tokio::spawn(async move {
            let _ = closed.await;
            if pool
                .remove_if(&session_id, |_, entry| entry.generation == generation)
                .is_some()
            {
                info!(session_id = %session_id, "Remote closed the connection");
            }
        });
    }

    fn shell_handle(&self, session_id: &str) -> ConnectionResult<Arc<Mutex<Box<dyn RemoteShell>>>> {
        self.pool
            .get(session_id)
            .map(|entry| entry.shell.clone())
            .ok_or_else(|| ConnectionError::NotFound(session_id.to_string()))
    }

    /// Open the interactive shell of a pooled connection.
    pub async fn open_shell(
        &self,
        session_id: &str,
        size: TerminalSize,
    ) -> ConnectionResult<ShellChannel> {
        let shell = self.shell_handle(session_id)?;
        let channel = shell.lock().await.open_shell(size).await?;

        if let Some(mut entry) = self.pool.get_mut(session_id) {
            entry.info.shell_size = Some(size);
        }
        debug!(session_id, cols = size.cols, rows = size.rows, "Shell opened");
        Ok(channel)
    }

    /// Resize the session's shell. A no-op until a shell is open.
    pub async fn resize(&self, session_id: &str, cols: u16, rows: u16) -> ConnectionResult<()> {
        let size = TerminalSize::new(cols, rows);
        let shell = {
            let mut entry = self
                .pool
                .get_mut(session_id)
                .ok_or_else(|| ConnectionError::NotFound(session_id.to_string()))?;
            if entry.info.shell_size.is_none() {
                return Ok(());
            }
            entry.info.shell_size = Some(size);
            entry.shell.clone()
        };

        shell.lock().await.resize(size).await
    }

    /// Close and forget the session's connection. Closing an unknown or
    /// already closed session does nothing. Returns whether a connection was
    /// closed.
    pub async fn close(&self, session_id: &str) -> bool {
        let Some((_, entry)) = self.pool.remove(session_id) else {
            return false;
        };

        if let Err(e) = entry.shell.lock().await.close().await {
            warn!(session_id, error = %e, "Error while closing connection");
        }
        info!(session_id, "Connection closed");
        true
    }

    /// Close every pooled connection.
    pub async fn close_all(&self) -> usize {
        let mut closed = 0;
        for session_id in self.session_ids() {
            if self.close(&session_id).await {
                closed += 1;
            }
        }
        closed
    }

    pub fn is_connected(&self, session_id: &str) -> bool {
        self.pool.contains_key(session_id)
    }

    pub fn info(&self, session_id: &str) -> Option<ConnectionInfo> {
        self.pool.get(session_id).map(|entry| entry.info.clone())
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.pool.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::super::transport::Connected;
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex as SyncMutex;
    use std::time::Duration;
    use tokio::sync::{mpsc, oneshot};

    #[derive(Default)]
    struct Calls {
        connects: usize,
        resizes: Vec<TerminalSize>,
        closes: usize,
    }

    /// Connector whose remote end can be hung up from the test.
    #[derive(Default)]
    struct FakeConnector {
        calls: Arc<SyncMutex<Calls>>,
        hangups: SyncMutex<Vec<oneshot::Sender<()>>>,
        fail_with: SyncMutex<Option<ConnectionError>>,
        delay: Option<Duration>,
    }

    struct FakeShell {
        calls: Arc<SyncMutex<Calls>>,
    }

    #[async_trait]
    impl RemoteShell for FakeShell {
        async fn open_shell(&mut self, _size: TerminalSize) -> ConnectionResult<ShellChannel> {
            let (input, _input_rx) = mpsc::channel(8);
            let (_output_tx, output) = mpsc::channel(8);
            Ok(ShellChannel { input, output })
        }

        async fn resize(&mut self, size: TerminalSize) -> ConnectionResult<()> {
            self.calls.lock().resizes.push(size);
            Ok(())
        }

        async fn close(&mut self) -> ConnectionResult<()> {
            self.calls.lock().closes += 1;
            Ok(())
        }
    }

    #[async_trait]
    impl ShellConnector for FakeConnector {
        async fn connect(
            &self,
            _session_id: &str,
            _config: &ConnectionConfig,
        ) -> ConnectionResult<Connected> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(error) = self.fail_with.lock().take() {
                return Err(error);
            }
            self.calls.lock().connects += 1;
            let (hangup, closed) = oneshot::channel();
            self.hangups.lock().push(hangup);
            Ok(Connected {
                shell: Box::new(FakeShell {
                    calls: self.calls.clone(),
                }),
                closed,
            })
        }
    }

    fn config() -> ConnectionConfig {
        ConnectionConfig {
            host: "10.0.0.1".to_string(),
            port: 22,
            username: "deploy".to_string(),
            identity_file: None,
            connect_timeout: Duration::from_secs(5),
            keepalive_interval: Duration::from_secs(15),
        }
    }

    #[tokio::test]
    async fn test_one_connection_per_session() {
        let connector = Arc::new(FakeConnector::default());
        let manager = ConnectionManager::new(connector.clone());

        let info = manager.create_connection("s1", &config()).await.unwrap();
        assert_eq!(info.host, "10.0.0.1");
        let err = manager.create_connection("s1", &config()).await.unwrap_err();
        assert!(matches!(err, ConnectionError::AlreadyConnected(_)));

        manager.create_connection("s2", &config()).await.unwrap();
        assert_eq!(manager.len(), 2);
        assert_eq!(connector.calls.lock().connects, 2);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let connector = Arc::new(FakeConnector::default());
        let manager = ConnectionManager::new(connector.clone());
        manager.create_connection("s1", &config()).await.unwrap();

        assert!(manager.close("s1").await);
        assert!(!manager.close("s1").await);
        assert!(!manager.close("never-opened").await);
        assert_eq!(connector.calls.lock().closes, 1);
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_close_leaves_other_sessions_alone() {
        let manager = ConnectionManager::new(Arc::new(FakeConnector::default()));
        manager.create_connection("s1", &config()).await.unwrap();
        manager.create_connection("s2", &config()).await.unwrap();

        manager.close("s1").await;
        assert!(manager.is_connected("s2"));
    }

    #[tokio::test]
    async fn test_resize_is_noop_without_shell() {
        let connector = Arc::new(FakeConnector::default());
        let manager = ConnectionManager::new(connector.clone());
        manager.create_connection("s1", &config()).await.unwrap();

        manager.resize("s1", 120, 40).await.unwrap();
        assert!(connector.calls.lock().resizes.is_empty());

        manager
            .open_shell("s1", TerminalSize::default())
            .await
            .unwrap();
        manager.resize("s1", 120, 40).await.unwrap();
        assert_eq!(
            connector.calls.lock().resizes,
            vec![TerminalSize::new(120, 40)]
        );
        assert_eq!(
            manager.info("s1").unwrap().shell_size,
            Some(TerminalSize::new(120, 40))
        );
    }

    #[tokio::test]
    async fn test_unknown_session_errors() {
        let manager = ConnectionManager::new(Arc::new(FakeConnector::default()));
        assert!(matches!(
            manager.open_shell("nope", TerminalSize::default()).await,
            Err(ConnectionError::NotFound(_))
        ));
        assert!(matches!(
            manager.resize("nope", 1, 1).await,
            Err(ConnectionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_remote_close_removes_entry() {
        let connector = Arc::new(FakeConnector::default());
        let manager = ConnectionManager::new(connector.clone());
        manager.create_connection("s1", &config()).await.unwrap();

        let hangup = connector.hangups.lock().pop().unwrap();
        hangup.send(()).unwrap();
        for _ in 0..50 {
            if !manager.is_connected("s1") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!manager.is_connected("s1"));
        assert!(!manager.close("s1").await);
    }

    #[tokio::test]
    async fn test_stale_close_event_keeps_new_connection() {
        let connector = Arc::new(FakeConnector::default());
        let manager = ConnectionManager::new(connector.clone());
        manager.create_connection("s1", &config()).await.unwrap();
        manager.close("s1").await;
        manager.create_connection("s1", &config()).await.unwrap();

        // Hang up the first connection after the session id was reused.
        let first = connector.hangups.lock().remove(0);
        let _ = first.send(());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(manager.is_connected("s1"));
    }

    #[tokio::test]
    async fn test_connect_failure_surfaces_without_retry() {
        let connector = Arc::new(FakeConnector::default());
        *connector.fail_with.lock() = Some(ConnectionError::Auth("Permission denied".into()));
        let manager = ConnectionManager::new(connector.clone());

        let err = manager.create_connection("s1", &config()).await.unwrap_err();
        assert!(matches!(err, ConnectionError::Auth(_)));
        assert_eq!(connector.calls.lock().connects, 0);
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_connect_timeout() {
        let connector = Arc::new(FakeConnector {
            delay: Some(Duration::from_secs(10)),
            ..Default::default()
        });
        let manager = ConnectionManager::new(connector);
        let config = config().with_connect_timeout(Duration::from_millis(50));

        let err = manager.create_connection("s1", &config).await.unwrap_err();
        assert!(matches!(err, ConnectionError::Timeout { .. }));
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_close_all() {
        let manager = ConnectionManager::new(Arc::new(FakeConnector::default()));
        for id in ["a", "b", "c"] {
            manager.create_connection(id, &config()).await.unwrap();
        }
        assert_eq!(manager.close_all().await, 3);
        assert!(manager.is_empty());
    }
}
