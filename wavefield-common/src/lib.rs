//! # Wavefield Common Library
//!
//! Shared code for the Wavefield spatial player:
//! - Error types
//! - Block/tick timing conversions
//! - Spatial primitives (positions, listener orientation)

pub mod error;
pub mod timing;
pub mod types;

pub use error::{Error, Result};
pub use types::{Orientation, Vec3};
