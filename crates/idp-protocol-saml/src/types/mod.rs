//! SAML 2.0 types and data structures.
//!
//! Requests the IdP parses, responses and assertions it builds, and the
//! service provider model the pipeline validates against.

mod assertion;
mod authn_request;
mod constants;
mod logout;
mod name_id;
mod response;
mod service_provider;
mod status;

pub use assertion::*;
pub use authn_request::*;
pub use constants::*;
pub use logout::*;
pub use name_id::*;
pub use response::*;
pub use service_provider::*;
pub use status::*;
