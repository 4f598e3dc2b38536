pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod serializer;
pub mod utils;

#[cfg(feature = "server")]
pub mod api;

pub use db::{Database, Snapshot};
pub use error::{Result, StoreError};
