//! # skua-core
//!
//! Core abstractions for the skua compute platform.
//!
//! This crate provides the foundational types used across all skua
//! components:
//!
//! - **Identifiers**: Strongly-typed IDs for jobs and events
//! - **Principals**: Callers and their privilege levels
//! - **Durations**: Human-shaped wall-clock durations for job limits
//! - **Error Types**: Shared error definitions and result types
//! - **Observability**: Logging initialization and secret redaction
//!
//! ## Crate Boundary
//!
//! `skua-core` is the **only** crate allowed to define shared primitives.
//! All cross-component interaction happens via contracts defined here or in
//! the domain crates that build on it.
//!
//! ## Example
//!
//! ```rust
//! use skua_core::prelude::*;
//!
//! let job_id = JobId::generate();
//! let caller = Principal::user("alice");
//! assert!(!caller.is_privileged());
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod id;
pub mod observability;
pub mod principal;
pub mod time;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use skua_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::id::{EventId, JobId};
    pub use crate::principal::{Principal, Role};
    pub use crate::time::SimpleDuration;
}

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use id::{EventId, JobId};
pub use observability::{LogFormat, Redacted, init_logging};
pub use principal::{Principal, Role};
pub use time::SimpleDuration;
