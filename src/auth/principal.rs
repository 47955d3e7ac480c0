//! Authenticated identity attached to a connection

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Guest,
    User,
    Admin,
    Superadmin,
}

impl Role {
    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin | Role::Superadmin)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub role: Role,
}

impl Principal {
    pub fn guest() -> Self {
        Self {
            id: "guest".to_string(),
            role: Role::Guest,
        }
    }

    #[allow(dead_code)]
    pub fn is_guest(&self) -> bool {
        self.role == Role::Guest
    }

    /// Capabilities surfaced to the client in the `welcome` envelope.
    pub fn capabilities(&self) -> Vec<&'static str> {
        match self.role {
            Role::Guest => vec!["subscribe:public"],
            Role::User => vec!["subscribe:public", "subscribe:authenticated", "chat:send"],
            Role::Admin => vec![
                "subscribe:public",
                "subscribe:authenticated",
                "subscribe:admin",
                "chat:send",
                "room:admin_presence",
            ],
            Role::Superadmin => vec![
                "subscribe:public",
                "subscribe:authenticated",
                "subscribe:admin",
                "chat:send",
                "room:admin_presence",
                "breaker:manual_reset",
            ],
        }
    }
}
