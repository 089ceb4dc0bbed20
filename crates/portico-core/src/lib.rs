//! Core types for portico.
//!
//! This crate provides the identity types shared between the auth crate and
//! the gateway:
//!
//! - **Identifiers**: validated newtypes for user and team ids
//! - **Principal**: the resolved caller identity forwarded to upstreams
//!
//! # Example
//!
//! ```
//! use portico_core::{Principal, TeamId, UserId};
//!
//! let principal = Principal::session(
//!     UserId::new("65f1c0ffee0123456789abcd").unwrap(),
//!     TeamId::new("65f1c0ffee0123456789abce").unwrap(),
//! );
//! assert!(principal.allows_origin("https://app.example"));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod ids;
pub mod principal;

pub use ids::{IdError, TeamId, UserId};
pub use principal::{Principal, PrincipalKind};
