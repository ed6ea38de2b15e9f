//! Aether-Common: Shared types, constants, and utilities.
//!
//! This crate provides common functionality used across aether:
//!
//! - **Typed IDs**: Type-safe UUID wrapper for queue items
//! - **Core Types**: Enums for media categories, item lifecycle, output formats
//! - **Path Utilities**: Functions to classify files by extension
//! - **Error Handling**: Common error types and result aliases
//!
//! # Examples
//!
//! ```
//! use aether_common::{ItemId, MediaType, Error, Result};
//! use aether_common::paths::media_type_of;
//! use std::path::Path;
//!
//! let item_id = ItemId::new();
//! assert_eq!(media_type_of(Path::new("clip.mkv")), Some(MediaType::Video));
//!
//! fn example(id: ItemId) -> Result<()> {
//!     Err(Error::not_found("item", id))
//! }
//! assert!(example(item_id).is_err());
//! ```

pub mod error;
pub mod ids;
pub mod paths;
pub mod types;

pub use error::{Error, Result};
pub use ids::*;
pub use types::*;
