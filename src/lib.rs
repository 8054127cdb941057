//! Identity-aware reverse proxy.
//!
//! Terminates TLS for a configurable set of external hostnames and
//! forwards authenticated traffic to internal backends. Access is gated
//! by OAuth2 single sign-on against per-backend allow-lists; WebSocket
//! upgrades are tunneled byte-for-byte; a new configuration document can
//! be applied at runtime by restarting the serving listeners in place.

// Core subsystems
pub mod config;
pub mod gateway;
pub mod routing;

// Identity
pub mod auth;

// Cross-cutting concerns
pub mod admin;
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod tls;

pub use config::{Config, ConfigStore};
pub use error::{Error, Result};
pub use gateway::Snapshot;
pub use lifecycle::{Lifecycle, LifecycleOptions};
