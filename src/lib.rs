//! librarian: index, browse and clean up a local library of content zipballs
//!
//! Each piece of content is a zip file named after its md5, carrying a JSON
//! metadata file. Metadata is normalized against a fixed field specification
//! and stored in SQLite together with view counts and tags.

pub mod archive;
pub mod cleanup;
pub mod commands;
pub mod config;
pub mod downloads;
pub mod error;
pub mod metadata;
pub mod progress;
pub mod resolver;
pub mod setup;

pub use error::{Error, Result};
