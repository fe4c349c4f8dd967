//! Module implement common utility functions and types.

pub mod files;

pub use files::{load_dir, walk, WalkRes};
