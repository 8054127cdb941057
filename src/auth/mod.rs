//! Identity subsystem.
//!
//! # Data Flow
//! ```text
//! Request with pylon cookie
//!     → session.rs (signature check) → email | none
//!
//! Unauthenticated request on a protected route
//!     → 302 to the gateway login URL (referer = host + path)
//!     → oidc.rs authorize redirect (state = referer)
//!     → provider → callback → code exchange → ID token email
//!     → session.rs issues the signed cookie → 302 back to the referer
//! ```
//!
//! # Design Decisions
//! - The cookie carries only the email; everything else derives from config
//! - Signing key is bound to the snapshot: key rotation logs everyone out
//! - Identity failures return a generic 500; user input is never echoed

pub mod oidc;
pub mod session;

pub use oidc::{email_from_id_token, OidcClient};
pub use session::{SessionStore, SESSION_COOKIE};
