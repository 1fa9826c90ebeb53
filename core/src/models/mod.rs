//! Data models for the GhostRecon core
//!
//! These types are used for HTTP bodies, realtime frames and view states.

mod types;

pub use types::*;
