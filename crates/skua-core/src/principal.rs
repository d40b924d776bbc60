//! Caller identity and privilege levels.
//!
//! Every operation on the orchestrator is performed on behalf of a
//! [`Principal`]. Backends authenticate as service principals named after
//! their registry entry; end users authenticate as user principals.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The privilege level of a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// An end user submitting and inspecting their own jobs.
    User,
    /// A registered service (typically a compute backend).
    Service,
    /// A privileged system principal allowed to act on any backend's jobs.
    Admin,
}

/// The identity a request is performed as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    /// The username (for services, the registered service name).
    pub username: String,
    /// The privilege level.
    pub role: Role,
}

impl Principal {
    /// Creates an end-user principal.
    #[must_use]
    pub fn user(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            role: Role::User,
        }
    }

    /// Creates a service principal (e.g. a compute backend).
    #[must_use]
    pub fn service(name: impl Into<String>) -> Self {
        Self {
            username: name.into(),
            role: Role::Service,
        }
    }

    /// Creates a privileged system principal.
    #[must_use]
    pub fn admin(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            role: Role::Admin,
        }
    }

    /// Returns true if this principal may act on any backend's jobs.
    #[must_use]
    pub const fn is_privileged(&self) -> bool {
        matches!(self.role, Role::Admin)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.username)
    }
}
