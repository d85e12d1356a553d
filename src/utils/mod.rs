//! Shared utility functions.

mod mime;

pub use mime::{detect_mime, mime_to_extension};
