//! Core behaviors behind the HTTP handlers.
//!
//! This includes:
//!   - Generating scenarios (model first, fixed fallback otherwise) and listing categories
//!   - Accepting responses (length + referential checks)
//!   - Evaluating responses (model first, deterministic fallback otherwise)

pub mod evaluations;
pub mod responses;
pub mod scenarios;
