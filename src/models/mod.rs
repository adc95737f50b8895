//! Core data models for the site builder.
//!
//! Builds and versions map to database tables via `sqlx::FromRow`; content is
//! assembled from several tables by the content gateway. Everything
//! serializes as JSON via `serde`.

pub mod build;
pub mod content;
pub mod version;
