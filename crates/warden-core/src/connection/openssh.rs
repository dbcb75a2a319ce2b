//! Remote shells through the system OpenSSH client.
//!
//! Each session runs a ControlMaster (`ssh -M -N -S <socket>`) that owns the
//! authenticated connection. The interactive shell is a second `ssh -S
//! <socket> -tt` multiplexed over it, attached to a local pseudo-terminal so
//! it can be resized. When the master exits the session is reported closed.

use async_trait::async_trait;
use portable_pty::{ChildKiller, CommandBuilder, MasterPty, PtySize, native_pty_system};
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::thread;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use super::transport::{
    ConnectionConfig, Connected, RemoteShell, ShellChannel, ShellConnector, TerminalSize,
};
use crate::config::ConnectionSettings;
use crate::error::{ConnectionError, ConnectionResult};

const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);
const CHANNEL_CAPACITY: usize = 256;

/// Stderr fragments that mean the server refused our credentials.
const AUTH_FAILURES: &[&str] = &[
    "Permission denied",
    "Host key verification failed",
    "Too many authentication failures",
    "No more authentication methods",
];

#[derive(Debug, Clone)]
pub struct OpenSshConnector {
    ssh_binary: String,
    control_dir: PathBuf,
}

impl OpenSshConnector {
    pub fn new(settings: &ConnectionSettings) -> Self {
        Self {
            ssh_binary: settings.ssh_binary.clone(),
            control_dir: settings
                .control_dir
                .clone()
                .unwrap_or_else(std::env::temp_dir),
        }
    }
}

/// Control socket for a session. Hashed to stay under the socket path limit.
pub fn control_socket_path(dir: &Path, session_id: &str) -> PathBuf {
    let digest = hex::encode(Sha256::digest(session_id.as_bytes()));
    dir.join(format!("warden-{}.sock", &digest[..16]))
}

fn master_args(config: &ConnectionConfig, socket: &Path) -> Vec<String> {
    let mut args = vec![
        "-M".to_string(),
        "-N".to_string(),
        "-S".to_string(),
        socket.display().to_string(),
        "-o".to_string(),
        "BatchMode=yes".to_string(),
        "-o".to_string(),
        "ControlPersist=no".to_string(),
        "-o".to_string(),
        format!("ConnectTimeout={}", config.connect_timeout.as_secs().max(1)),
        "-o".to_string(),
        format!(
            "ServerAliveInterval={}",
            config.keepalive_interval.as_secs().max(1)
        ),
        "-p".to_string(),
        config.port.to_string(),
        "-l".to_string(),
        config.username.clone(),
    ];
    if let Some(identity) = &config.identity_file {
        args.push("-i".to_string());
        args.push(identity.display().to_string());
        args.push("-o".to_string());
        args.push("IdentitiesOnly=yes".to_string());
    }
    // A host starting with `-` must not be read as an option.
    args.push("--".to_string());
    args.push(config.host.clone());
    args
}

fn shell_args(socket: &Path, host: &str) -> Vec<String> {
    vec![
        "-S".to_string(),
        socket.display().to_string(),
        "-tt".to_string(),
        "--".to_string(),
        host.to_string(),
    ]
}

/// Map the master's stderr to an auth or transport error.
fn classify_failure(stderr: &str) -> ConnectionError {
    let message = stderr.trim().to_string();
    if AUTH_FAILURES.iter().any(|needle| stderr.contains(needle)) {
        ConnectionError::Auth(message)
    } else if message.is_empty() {
        ConnectionError::Transport("ssh exited before the connection was ready".to_string())
    } else {
        ConnectionError::Transport(message)
    }
}

#[async_trait]
impl ShellConnector for OpenSshConnector {
    async fn connect(
        &self,
        session_id: &str,
        config: &ConnectionConfig,
    ) -> ConnectionResult<Connected> {
        let socket = control_socket_path(&self.control_dir, session_id);
        let mut master = Command::new(&self.ssh_binary)
            .args(master_args(config, &socket))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // Wait for the master to accept multiplexed sessions. The caller
        // bounds this with the connect timeout and dropping the future kills
        // the master.
        loop {
            if master.try_wait()?.is_some() {
                let mut stderr = String::new();
                if let Some(mut pipe) = master.stderr.take() {
                    let _ = pipe.read_to_string(&mut stderr).await;
                }
                return Err(classify_failure(&stderr));
            }

            let check = Command::new(&self.ssh_binary)
                .arg("-S")
                .arg(&socket)
                .args(["-O", "check"])
                .arg(&config.host)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await?;
            if check.success() {
                break;
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
        debug!(session_id, socket = %socket.display(), "Control master ready");

        let (closed_tx, closed) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(supervise_master(
            session_id.to_string(),
            master,
            shutdown_rx,
            closed_tx,
        ));

        Ok(Connected {
            shell: Box::new(OpenSshShell {
                ssh_binary: self.ssh_binary.clone(),
                socket,
                host: config.host.clone(),
                shutdown: Some(shutdown_tx),
                pty: None,
            }),
            closed,
        })
    }
}

/// Wait for the master to exit, or kill it on request, then report closed.
async fn supervise_master(
    session_id: String,
    mut master: Child,
    shutdown: oneshot::Receiver<()>,
    closed: oneshot::Sender<()>,
) {
    tokio::select! {
        status = master.wait() => {
            debug!(session_id = %session_id, ?status, "Control master exited");
        }
        _ = shutdown => {
            if let Err(e) = master.kill().await {
                warn!(session_id = %session_id, error = %e, "Failed to stop control master");
            }
        }
    }
    let _ = closed.send(());
}

struct PtyShell {
    master: Box<dyn MasterPty + Send>,
    killer: Box<dyn ChildKiller + Send + Sync>,
}

struct OpenSshShell {
    ssh_binary: String,
    socket: PathBuf,
    host: String,
    shutdown: Option<oneshot::Sender<()>>,
    pty: Option<PtyShell>,
}

fn pty_size(size: TerminalSize) -> PtySize {
    PtySize {
        rows: size.rows,
        cols: size.cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

fn transport(e: impl std::fmt::Display) -> ConnectionError {
    ConnectionError::Transport(e.to_string())
}

#[async_trait]
impl RemoteShell for OpenSshShell {
    async fn open_shell(&mut self, size: TerminalSize) -> ConnectionResult<ShellChannel> {
        if self.pty.is_some() {
            return Err(ConnectionError::Transport("shell already open".to_string()));
        }

        let pair = native_pty_system()
            .openpty(pty_size(size))
            .map_err(transport)?;

        let mut cmd = CommandBuilder::new(&self.ssh_binary);
        cmd.args(shell_args(&self.socket, &self.host));
        cmd.env("TERM", "xterm-256color");

        let child = pair.slave.spawn_command(cmd).map_err(transport)?;
        drop(pair.slave);
        let killer = child.clone_killer();
        let writer = pair.master.take_writer().map_err(transport)?;
        let reader = pair.master.try_clone_reader().map_err(transport)?;

        let (input, input_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (output_tx, output) = mpsc::channel(CHANNEL_CAPACITY);
        spawn_reader(reader, output_tx);
        spawn_writer(writer, input_rx);

        // Reap the child so it does not linger as a zombie.
        thread::spawn(move || {
            let mut child = child;
            let _ = child.wait();
        });

        self.pty = Some(PtyShell {
            master: pair.master,
            killer,
        });
        Ok(ShellChannel { input, output })
    }

    async fn resize(&mut self, size: TerminalSize) -> ConnectionResult<()> {
        match &self.pty {
            Some(pty) => pty.master.resize(pty_size(size)).map_err(transport),
            None => Ok(()),
        }
    }

    async fn close(&mut self) -> ConnectionResult<()> {
        if let Some(mut pty) = self.pty.take() {
            // Already exited is fine.
            let _ = pty.killer.kill();
        }
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let _ = tokio::fs::remove_file(&self.socket).await;
        Ok(())
    }
}

fn spawn_reader(mut reader: Box<dyn Read + Send>, output: mpsc::Sender<Vec<u8>>) {
    thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if output.blocking_send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    // EIO is how a pty reports the other side hung up.
                    debug!(error = %e, "Shell output closed");
                    break;
                }
            }
        }
    });
}

fn spawn_writer(mut writer: Box<dyn Write + Send>, mut input: mpsc::Receiver<Vec<u8>>) {
    thread::spawn(move || {
        while let Some(bytes) = input.blocking_recv() {
            if let Err(e) = writer.write_all(&bytes).and_then(|_| writer.flush()) {
                error!(error = %e, "Shell input write failed");
                break;
            }
        }
    });
}
