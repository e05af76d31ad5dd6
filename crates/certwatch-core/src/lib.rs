//! `certwatch-core` — configuration and shared error types.
//!
//! One [`CertwatchConfig`] is built at process start (TOML file merged with
//! `CERTWATCH_*` environment overrides) and handed to every component
//! constructor explicitly. There is no global configuration lookup.

pub mod config;
pub mod error;

pub use config::{CertwatchConfig, DnsApi};
pub use error::{CertwatchError, Result};
