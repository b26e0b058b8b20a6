pub mod db;
pub mod error;
pub mod registry;
pub mod types;

pub use error::{DeviceError, Result};
pub use registry::{DeviceLookup, DeviceRegistry};
pub use types::{Device, Platform};
