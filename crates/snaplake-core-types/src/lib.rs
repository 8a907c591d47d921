//! Core types shared across SnapLake crates
//!
//! - **Sensitive data**: `Sensitive<T>` marker for automatic redaction of
//!   passwords, access keys and encryption secrets
//! - **Schema constants**: canonical structured-logging field keys and event names

pub mod schema;
pub mod sensitive;

pub use sensitive::Sensitive;
