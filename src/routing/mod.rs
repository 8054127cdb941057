//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route Compilation (per config snapshot):
//!     ProxyEntry[]
//!     → parse internal URLs
//!     → join + compile unauthenticated-route regexes
//!     → freeze allow-lists as sets
//!     → immutable RouteTable
//!
//! Per request:
//!     Host header → table.lookup → RouteEntry (or 404)
//! ```
//!
//! # Design Decisions
//! - Table compiled once per snapshot, immutable at runtime
//! - O(1) host lookup via HashMap; port stripped before matching
//! - An empty unauthenticated-route list compiles to "match nothing",
//!   never to the empty pattern (which matches everything)

pub mod table;

pub use table::{strip_port, subdomain, RouteEntry, RouteTable};
