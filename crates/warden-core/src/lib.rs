pub mod broker;
pub mod clock;
pub mod config;
pub mod connection;
pub mod error;
pub mod models;
pub mod recording;
pub mod security;
pub mod storage;
pub mod store;

pub use models::*;

use std::sync::Arc;
use tracing::info;

use broker::SessionBroker;
use clock::{Clock, SystemClock};
use config::WardenConfig;
use connection::{ConnectionConfig, ConnectionManager, OpenSshConnector, ShellConnector};
use recording::RecorderPool;
use security::{ApprovalWorkflow, PolicyEngine, SweeperHandle};
use storage::Storage;

/// Core state shared by every front end.
///
/// Owns the storage handle, the approval workflow, the policy engine and
/// the session broker, all wired to the same clock.
pub struct WardenCore {
    pub config: WardenConfig,
    pub storage: Arc<Storage>,
    pub clock: Arc<dyn Clock>,
    pub approvals: Arc<ApprovalWorkflow>,
    pub engine: Arc<PolicyEngine>,
    pub broker: SessionBroker,
}

impl WardenCore {
    /// Open the configured database and connect sessions through OpenSSH.
    pub fn new(config: WardenConfig) -> anyhow::Result<Self> {
        let db_path = config.database_path()?;
        let storage = Arc::new(Storage::new(&db_path.to_string_lossy())?);
        let connector = Arc::new(OpenSshConnector::new(&config.connection));

        info!(database = %db_path.display(), "Initializing Warden");
        Self::with_parts(config, storage, connector, Arc::new(SystemClock))
    }

    /// Assemble the core from explicit collaborators.
    pub fn with_parts(
        config: WardenConfig,
        storage: Arc<Storage>,
        connector: Arc<dyn ShellConnector>,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let timezone = config.policy.tz()?;

        let approvals = Arc::new(
            ApprovalWorkflow::new(storage.clone(), clock.clone())
                .with_directory(storage.clone())
                .with_default_duration(config.approval.default_duration_hours)
                .with_max_duration(config.approval.max_duration_hours),
        );
        let engine = Arc::new(
            PolicyEngine::new(storage.clone(), approvals.clone(), clock.clone())
                .with_timezone(timezone),
        );
        let recorders = Arc::new(
            RecorderPool::new(storage.clone(), clock.clone())
                .with_enabled(config.recording.enabled),
        );
        let connections = Arc::new(ConnectionManager::new(connector));
        let broker = SessionBroker::new(engine.clone(), connections, recorders);

        Ok(Self {
            config,
            storage,
            clock,
            approvals,
            engine,
            broker,
        })
    }

    /// Connection parameters for a server under the configured settings.
    pub fn connection_config(&self, server: &Server) -> ConnectionConfig {
        ConnectionConfig::for_server(server, &self.config.connection)
    }

    /// Start the periodic approval expiry sweep at the configured interval.
    pub fn spawn_expiry_sweeper(&self) -> SweeperHandle {
        let interval = std::time::Duration::from_secs(self.config.approval.sweep_interval_secs);
        self.approvals.clone().spawn_expiry_sweeper(interval)
    }
}
