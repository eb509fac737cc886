//! Pictor Core - shared types for the Pictor generation client
//!
//! This crate provides the types every other Pictor crate depends on:
//! - `PictorError` - the job lifecycle error taxonomy and Result alias
//! - `ContentHash` - SHA-256 hashing of downloaded artifacts

mod error;
mod hash;

pub use error::{PictorError, Result};
pub use hash::ContentHash;
