//! End-to-End Integration Tests
//!
//! These tests drive the SAML message security pipeline the way an SP and
//! the IdP's HTTP layer would: requests are encoded with real keys, pushed
//! through extraction, validation and signature checks, and the responses
//! are decoded and verified on the way back.

mod common;
mod bindings;
mod pipeline;
mod responses;
mod signatures;
