//! Tablet engine
//!
//! This crate assembles the lower layers into a usable tablet:
//! - TabletConfig: `tablet.toml` loading and defaults
//! - Tablet: open, submit/begin transactions, close with drain
//!
//! The engine is the only component that knows about configuration files and
//! how the tracker is wired into the server's metric and memory hierarchies.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod tablet;

pub use config::{TabletConfig, CONFIG_FILE_NAME};
pub use tablet::Tablet;
