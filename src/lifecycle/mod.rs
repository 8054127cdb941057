//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     Load config → build snapshot → certificate manager → start listeners
//!
//! Admin POST /config (after persist):
//!     reload + rebuild snapshot
//!     → graceful shutdown, 5s deadline, wait for both listener tasks
//!     → swap snapshot → fresh listeners + fresh certificate whitelist
//! ```
//!
//! # Design Decisions
//! - The serving window closes for under the deadline during restarts;
//!   refused connections during the gap are accepted
//! - Requests in flight keep the snapshot their router was built with;
//!   the swap happens only after the drain barrier
//! - The admin listener lives outside the controller and survives restarts

pub mod controller;

pub use controller::{Lifecycle, LifecycleOptions};
