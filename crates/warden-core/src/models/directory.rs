//! Server and user records looked up during policy evaluation.

use serde::{Deserialize, Serialize};

use super::access::Role;

/// A managed server that sessions can be brokered to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub id: String,
    pub name: String,
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    /// Remote account sessions log in as
    pub username: String,
    pub is_active: bool,
}

fn default_ssh_port() -> u16 {
    22
}

impl Server {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        host: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            host: host.into(),
            port: default_ssh_port(),
            username: username.into(),
            is_active: true,
        }
    }
}

/// A person that requests or approves access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub role: Role,
    pub is_active: bool,
}

impl User {
    pub fn new(id: impl Into<String>, username: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            role,
            is_active: true,
        }
    }
}
