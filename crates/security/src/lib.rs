//! Security checks for Infrared file writes.
//!
//! Provides:
//! - **Path validation**: relative-only paths, no traversal, no home references
//! - **Size ceilings**: content larger than the configured limit is refused

pub mod path;

pub use path::{PathValidationError, validate_content_size, validate_relative_path};
