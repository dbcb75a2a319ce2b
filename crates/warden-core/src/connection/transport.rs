//! Remote-shell client seam.
//!
//! The connection manager only sees these traits; [`super::OpenSshConnector`]
//! is the production implementation and tests plug in their own.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use crate::config::ConnectionSettings;
use crate::error::ConnectionResult;
use crate::models::Server;

/// Terminal geometry in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSize {
    pub cols: u16,
    pub rows: u16,
}

impl TerminalSize {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

/// Where and how to connect.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    /// Private key; the client's defaults are used when unset
    pub identity_file: Option<PathBuf>,
    /// Upper bound on connection establishment
    pub connect_timeout: Duration,
    pub keepalive_interval: Duration,
}

impl ConnectionConfig {
    pub fn for_server(server: &Server, settings: &ConnectionSettings) -> Self {
        Self {
            host: server.host.clone(),
            port: server.port,
            username: server.username.clone(),
            identity_file: None,
            connect_timeout: settings.connect_timeout(),
            keepalive_interval: Duration::from_secs(settings.keepalive_interval_secs),
        }
    }

    pub fn with_identity_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_file = Some(path.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// Duplex byte channel of an interactive shell.
///
/// Dropping `input` hangs up the write side; `output` yields `None` once the
/// remote shell is gone.
#[derive(Debug)]
pub struct ShellChannel {
    pub input: mpsc::Sender<Vec<u8>>,
    pub output: mpsc::Receiver<Vec<u8>>,
}

/// An established, authenticated connection.
pub struct Connected {
    pub shell: Box<dyn RemoteShell>,
    /// Resolves (or errors) when the remote end goes away
    pub closed: oneshot::Receiver<()>,
}

impl std::fmt::Debug for Connected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connected").finish_non_exhaustive()
    }
}

/// Establishes connections. Must not retry on failure.
#[async_trait]
pub trait ShellConnector: Send + Sync {
    async fn connect(&self, session_id: &str, config: &ConnectionConfig)
    -> ConnectionResult<Connected>;
}

/// Live client handle for one session.
#[async_trait]
pub trait RemoteShell: Send {
    /// Start an interactive shell on a pseudo-terminal of `size`.
    async fn open_shell(&mut self, size: TerminalSize) -> ConnectionResult<ShellChannel>;

    async fn resize(&mut self, size: TerminalSize) -> ConnectionResult<()>;

    /// Tear the connection down. Called at most once.
    async fn close(&mut self) -> ConnectionResult<()>;
}
