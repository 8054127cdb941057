//! Observability subsystem.
//!
//! Structured logs carry the routing decisions (path, backend, remote
//! address); metrics count forwards, auth outcomes and live tunnels.
//! The metrics listener is optional and off unless an address is given.

pub mod logging;
pub mod metrics;
