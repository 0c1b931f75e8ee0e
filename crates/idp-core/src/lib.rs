//! # idp-core
//!
//! Core configuration, error handling, and time abstraction shared by the
//! identity provider crates.
//!
//! This crate provides foundational types used across the SAML protocol
//! engine and its cryptographic backend.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod clock;
pub mod config;
pub mod error;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::SamlConfig;
pub use error::{Error, Result};
