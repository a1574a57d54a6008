//! Domain layer types and invariants.

pub mod file_types;
