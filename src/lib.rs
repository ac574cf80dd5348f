//! Admission Guard - per-client request admission for a validation endpoint
//!
//! This crate decides, per client, whether a validation request may proceed
//! or must be rejected for excessive request rate. A token bucket limiter is
//! the primary algorithm, with a trailing fixed-window limiter available as an
//! alternative mode. Per-key state lives in a bounded store that is swept of
//! idle keys in the background.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
pub mod validation;
