//! # hoard-core
//!
//! Core types, traits, and abstractions for the hoard resolution pipeline.
//!
//! This crate holds the domain models shared by every other hoard crate,
//! the repository and collaborator traits the resolvers are written against,
//! and the in-process [`ResultCache`].

pub mod cache;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use cache::{CacheConfig, Clock, ManualClock, ResultCache, SystemClock};
pub use error::{Error, Result};
pub use models::*;
pub use traits::*;
pub use uuid_utils::{extract_timestamp, is_v7, new_v7};
