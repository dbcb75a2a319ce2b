//! Session broker: the lifecycle of one brokered shell session.
//!
//! ```text
//! open_session ─► PolicyEngine::evaluate ─► ConnectionManager ─► RecorderPool::start
//! send_input   ─► recorder ─► LineBuffer ─► CommandFilter ─► shell (or Ctrl-C)
//! shell output ─► recorder ─► caller
//! end_session  ─► recorder stop (sealed) ─► connection close
//! ```
//!
//! The broker is constructed once at process start and shut down
//! explicitly; it owns both session pools.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::connection::{ConnectionConfig, ConnectionManager, TerminalSize};
use crate::error::{ConnectionError, SessionError, SessionResult};
use crate::models::{AccessDecision, AccessRequest, CommandCheckResult, StoredRecording};
use crate::recording::RecorderPool;
use crate::security::{
    CommandFilter, FilterCache, InputSegment, LineBuffer, PolicyEngine, command_readings,
};

/// Commands at or above this score are reported on the audit target even
/// when allowed.
pub const HIGH_RISK_THRESHOLD: f64 = 0.5;

/// Risk reported for a line the broker could not follow.
pub const UNTRACKED_LINE_RISK: f64 = 0.5;

const OUTPUT_BUFFER: usize = 256;
const CTRL_C: u8 = 0x03;

/// A granted, connected session.
#[derive(Debug)]
pub struct OpenedSession {
    pub session_id: String,
    pub decision: AccessDecision,
    /// Shell output, already mirrored into the recording
    pub output: mpsc::Receiver<Vec<u8>>,
}

/// What happened to a chunk of input.
#[derive(Debug, Clone, PartialEq)]
pub enum InputOutcome {
    /// Forwarded to the shell; one result per command line submitted
    Forwarded(Vec<CommandCheckResult>),
    /// A submitted command was refused and the line cancelled on the shell
    Blocked(CommandCheckResult),
    /// The session is read-only; nothing was forwarded
    ReadOnly,
}

struct LiveSession {
    requester_id: String,
    filter: Arc<CommandFilter>,
    read_only: bool,
    input: mpsc::Sender<Vec<u8>>,
    keys: Arc<Mutex<KeyState>>,
}

/// Per-session keystroke state.
#[derive(Default)]
struct KeyState {
    utf8: Utf8Carry,
    line: LineBuffer,
}

struct BrokerInner {
    engine: Arc<PolicyEngine>,
    connections: Arc<ConnectionManager>,
    recorders: Arc<RecorderPool>,
    filters: FilterCache,
    sessions: DashMap<String, LiveSession>,
}

#[derive(Clone)]
pub struct SessionBroker {
    inner: Arc<BrokerInner>,
}

impl SessionBroker {
    pub fn new(
        engine: Arc<PolicyEngine>,
        connections: Arc<ConnectionManager>,
        recorders: Arc<RecorderPool>,
    ) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                engine,
                connections,
                recorders,
                filters: FilterCache::new(),
                sessions: DashMap::new(),
            }),
        }
    }

    pub fn filters(&self) -> &FilterCache {
        &self.inner.filters
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.inner.connections
    }

    pub fn recorders(&self) -> &RecorderPool {
        &self.inner.recorders
    }

    /// Evaluate, connect, open a shell and start recording.
    pub async fn open_session(
        &self,
        request: &AccessRequest,
        config: &ConnectionConfig,
        size: TerminalSize,
    ) -> SessionResult<OpenedSession> {
        let decision = self.inner.engine.evaluate(request).await;
        if !decision.allowed {
            return Err(SessionError::Denied(Box::new(decision)));
        }

        let session_id = uuid::Uuid::new_v4().to_string();
        let connections = &self.inner.connections;
        connections.create_connection(&session_id, config).await?;
        let channel = match connections.open_shell(&session_id, size).await {
            Ok(channel) => channel,
            Err(e) => {
                connections.close(&session_id).await;
                return Err(e.into());
            }
        };

        let filter = self
            .inner
            .filters
            .filter_for(decision.policy_id.as_deref(), decision.restrictions.as_ref());
        let read_only = decision
            .restrictions
            .as_ref()
            .is_some_and(|restrictions| restrictions.read_only);

        self.inner.recorders.start(&session_id, size);
        self.inner.sessions.insert(
            session_id.clone(),
            LiveSession {
                requester_id: request.requester_id.clone(),
                filter,
                read_only,
                input: channel.input,
                keys: Arc::new(Mutex::new(KeyState::default())),
            },
        );

        let (output_tx, output) = mpsc::channel(OUTPUT_BUFFER);
        self.spawn_output_pump(session_id.clone(), channel.output, output_tx);

        info!(
            target: "warden::audit",
            session_id = %session_id,
            requester_id = %request.requester_id,
            server_id = %request.target_server_id,
            policy_id = decision.policy_id.as_deref().unwrap_or("-"),
            read_only,
            "Session opened"
        );

        Ok(OpenedSession {
            session_id,
            decision,
            output,
        })
    }

    /// Record, filter and forward keystrokes.
    ///
    /// Keystrokes are forwarded byte for byte as they arrive; on Enter the
    /// assembled line is checked and either the Enter key or a Ctrl-C is
    /// sent. A line edited with keys the broker cannot follow is cancelled.
    /// Input after a cancelled line in the same chunk is dropped. A
    /// character split across calls is held back until it is complete.
    pub async fn send_input(&self, session_id: &str, data: &[u8]) -> SessionResult<InputOutcome> {
        let (requester_id, filter, read_only, input, keys) = {
            let session = self
                .inner
                .sessions
                .get(session_id)
                .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
            (
                session.requester_id.clone(),
                session.filter.clone(),
                session.read_only,
                session.input.clone(),
                session.keys.clone(),
            )
        };

        let (complete, segments) = {
            let mut keys = keys.lock();
            let complete = keys.utf8.take_complete(data);
            let segments = if read_only {
                Vec::new()
            } else {
                keys.line.feed(&complete)
            };
            (complete, segments)
        };
        if !complete.is_empty() {
            self.inner
                .recorders
                .record_input(session_id, &String::from_utf8_lossy(&complete));
        }

        if read_only {
            debug!(session_id, "Dropping input on read-only session");
            return Ok(InputOutcome::ReadOnly);
        }

        let mut outgoing = Vec::with_capacity(data.len());
        let mut checked = Vec::new();
        let mut blocked = None;
        for segment in segments {
            match segment {
                InputSegment::Keys(bytes) => outgoing.extend_from_slice(&bytes),
                InputSegment::Submit {
                    line: typed,
                    terminator,
                    untracked,
                } => {
                    let command = typed.trim();
                    let result = if untracked {
                        CommandCheckResult::blocked(
                            "Line was edited with keys that cannot be followed; retype it",
                            UNTRACKED_LINE_RISK,
                            None,
                        )
                    } else {
                        filter.check_any(&command_readings(&typed))
                    };

                    if !result.allowed {
                        warn!(
                            target: "warden::audit",
                            session_id,
                            requester_id = %requester_id,
                            command = %command,
                            risk_score = result.risk_score,
                            matched_pattern = result.matched_pattern.as_deref().unwrap_or("-"),
                            reason = %result.reason,
                            "Command blocked"
                        );
                        outgoing.push(CTRL_C);
                        blocked = Some(result);
                        break;
                    }

                    if result.risk_score >= HIGH_RISK_THRESHOLD {
                        warn!(
                            target: "warden::audit",
                            session_id,
                            requester_id = %requester_id,
                            command = %command,
                            risk_score = result.risk_score,
                            "High-risk command"
                        );
                    }
                    outgoing.push(terminator);
                    checked.push(result);
                }
            }
        }

        if blocked.is_some() {
            keys.lock().line.clear();
        }

        if !outgoing.is_empty() {
            input
                .send(outgoing)
                .await
                .map_err(|_| ConnectionError::Transport("shell input closed".to_string()))?;
        }

        Ok(match blocked {
            Some(result) => InputOutcome::Blocked(result),
            None => InputOutcome::Forwarded(checked),
        })
    }

    /// Mirror shell output into the session's recording.
    pub fn record_output(&self, session_id: &str, data: &[u8]) {
        self.inner
            .recorders
            .record_output(session_id, &String::from_utf8_lossy(data));
    }

    pub async fn resize(&self, session_id: &str, cols: u16, rows: u16) -> SessionResult<()> {
        Ok(self.inner.connections.resize(session_id, cols, rows).await?)
    }

    /// Seal the recording and close the connection. Ending an unknown or
    /// already ended session returns `Ok(None)`.
    pub async fn end_session(&self, session_id: &str) -> SessionResult<Option<StoredRecording>> {
        let live = self.inner.sessions.remove(session_id);
        let recording = self.inner.recorders.stop(session_id).await;
        let closed = self.inner.connections.close(session_id).await;

        if live.is_some() || closed {
            info!(target: "warden::audit", session_id, "Session ended");
        }
        Ok(recording?)
    }

    /// End every live session. Returns how many were ended.
    pub async fn shutdown(&self) -> usize {
        let session_ids: Vec<String> = self
            .inner
            .sessions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        let mut ended = 0;
        for session_id in session_ids {
            if let Err(e) = self.end_session(&session_id).await {
                warn!(session_id = %session_id, error = %e, "Failed to end session cleanly");
            }
            ended += 1;
        }

        self.inner.recorders.stop_all().await;
        self.inner.connections.close_all().await;
        info!(sessions = ended, "Session broker shut down");
        ended
    }

    pub fn is_live(&self, session_id: &str) -> bool {
        self.inner.sessions.contains_key(session_id)
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.inner
            .sessions
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Copy shell output into the recording and on to the caller. When the
    /// shell goes away the session is ended.
    fn spawn_output_pump(
        &self,
        session_id: String,
        mut shell_output: mpsc::Receiver<Vec<u8>>,
        forward: mpsc::Sender<Vec<u8>>,
    ) {
        let broker = self.clone();
        tokio::spawn(async move {
            let mut utf8 = Utf8Carry::default();
            while let Some(chunk) = shell_output.recv().await {
                let complete = utf8.take_complete(&chunk);
                if !complete.is_empty() {
                    broker.record_output(&session_id, &complete);
                }
                // The caller may have stopped reading; keep recording anyway.
                let _ = forward.send(chunk).await;
            }
            let rest = utf8.flush();
            if !rest.is_empty() {
                broker.record_output(&session_id, &rest);
            }

            if broker.is_live(&session_id) {
                info!(session_id = %session_id, "Shell closed by remote");
                if let Err(e) = broker.end_session(&session_id).await {
                    warn!(session_id = %session_id, error = %e, "Failed to end session");
                }
            }
        });
    }
}

/// Holds back a character split across two chunks of a byte stream.
#[derive(Debug, Default)]
struct Utf8Carry {
    tail: Vec<u8>,
}

impl Utf8Carry {
    /// The held bytes plus `chunk`, minus any incomplete trailing character,
    /// which is kept for the next call.
    fn take_complete(&mut self, chunk: &[u8]) -> Vec<u8> {
        let mut bytes = std::mem::take(&mut self.tail);
        bytes.extend_from_slice(chunk);
        let boundary = find_utf8_boundary(&bytes);
        self.tail = bytes.split_off(boundary);
        bytes
    }

    fn flush(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.tail)
    }
}

/// Length of the longest valid UTF-8 prefix, leaving a split trailing
/// character for the next chunk.
fn find_utf8_boundary(bytes: &[u8]) -> usize {
    match std::str::from_utf8(bytes) {
        Ok(_) => bytes.len(),
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        // Invalid (not just truncated) bytes are passed through lossily.
        Err(_) => bytes.len(),
    }
}
