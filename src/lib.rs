//! stockroom: supplier product feed ETL pipeline
//!
//! Feed bytes flow through a streaming XML parser into a change-detecting
//! staging store, then a separate normalization pass resolves categories
//! through a layered rule chain and upserts canonical catalog products.

pub mod catalog;
pub mod commands;
pub mod config;
pub mod error;
pub mod feed;
pub mod mapping;
pub mod models;
pub mod progress;
pub mod store;

pub use error::{Error, Result};
