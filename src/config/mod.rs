//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config.json
//!     → store.rs (read & deserialize)
//!     → validation.rs (semantic checks)
//!     → Config (validated, immutable snapshot)
//!     → route table / session store / OIDC client derive from it
//!
//! On admin POST /config:
//!     store.rs persists the new document
//!     → lifecycle controller drains listeners
//!     → store.rs reloads, snapshot rebuilt, listeners restarted
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes go through the restart protocol
//! - All fields have defaults so minimal documents parse
//! - Validation separates syntactic (serde) from semantic checks

pub mod schema;
pub mod store;
pub mod validation;

pub use schema::{Config, ListenConfig, OauthConfig, ProxyEntry};
pub use store::ConfigStore;
