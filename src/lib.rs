//! Consul service discovery for scrape targets.
//!
//! Watches the Consul catalog with blocking queries and shares one watcher
//! between all jobs using an identical `consul_sd_config`.
mod config;
mod constants;
mod discovery;
mod errors;

pub use crate::config::*;
pub use discovery::*;
pub use errors::*;
