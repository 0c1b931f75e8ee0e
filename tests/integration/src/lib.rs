//! End-to-end tests for the SAML message security pipeline.
//!
//! The test suite lives under `tests/`; this crate has no library code.
