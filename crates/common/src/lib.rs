//! Common utilities and types shared across the VRRP agent crates.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
