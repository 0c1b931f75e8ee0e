//! SAML bindings implementation.
//!
//! This module implements the SAML 2.0 bindings for message transport:
//!
//! - **HTTP-POST Binding** - Messages are base64-encoded and sent in HTML forms
//! - **HTTP-Redirect Binding** - Messages are deflated, base64-encoded, and URL-encoded
//!
//! Decoding always goes through a [`BoundedReadStream`] so a message can
//! never inflate past the configured ceiling.

mod bounded;
mod post;
mod redirect;
mod request;

use std::fmt;

pub use bounded::*;
pub use post::*;
pub use redirect::*;
pub use request::*;

/// SAML message direction for binding operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamlMessageType {
    /// Request message.
    Request,
    /// Response message.
    Response,
}

impl SamlMessageType {
    /// Returns the form parameter name for this message type.
    #[must_use]
    pub const fn form_param(&self) -> &'static str {
        match self {
            Self::Request => "SAMLRequest",
            Self::Response => "SAMLResponse",
        }
    }
}

/// Binding an inbound message arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingType {
    /// HTTP-Redirect (GET).
    Redirect,
    /// HTTP-POST.
    Post,
}

impl fmt::Display for BindingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Redirect => "HTTP-Redirect",
            Self::Post => "HTTP-POST",
        })
    }
}
