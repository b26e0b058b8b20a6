//! Shared building blocks for the notecue workspace: configuration, the
//! top-level error type and the timestamp/ID conventions every store uses.

pub mod config;
pub mod error;
pub mod types;

pub use config::NotecueConfig;
pub use error::{CoreError, Result};
