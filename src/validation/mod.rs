//! Validation endpoint logic: category gate, key derivation and admission.

mod service;
mod verdict;

pub use service::ValidationService;
pub use verdict::{ValidateRequest, ValidationError, Verdict};
