//! SnapLake Store - metadata persistence and lake storage
//!
//! Provides:
//! - SQLite metadata database with an embedded, checksummed migration runner
//! - Repository traits and SQLite implementations for datasources, snapshots,
//!   storage config and users
//! - One-time credential migration (legacy plaintext to sealed values)
//! - Storage providers for the lake: local filesystem, S3-compatible object
//!   storage, and a caching decorator with singleflight downloads

pub mod codec;
pub mod credentials;
pub mod db;
pub mod errors;
pub mod lake;
pub mod migrations;
pub mod repo;

// Re-export key types
pub use db::Database;
pub use errors::Result;
