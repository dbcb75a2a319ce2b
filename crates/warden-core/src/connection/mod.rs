//! Remote-shell connections for brokered sessions.

mod manager;
mod openssh;
mod transport;

pub use manager::{ConnectionInfo, ConnectionManager};
pub use openssh::{OpenSshConnector, control_socket_path};
pub use transport::{
    ConnectionConfig, Connected, RemoteShell, ShellChannel, ShellConnector, TerminalSize,
};
