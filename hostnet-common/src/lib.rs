//! # hostnet Common
//!
//! Shared utilities for the hostnet components.
//!
//! ## Logging
//!
//! ```rust,no_run
//! use hostnet_common::init_logging;
//!
//! init_logging("info").unwrap();
//! tracing::info!(bridge = "pg-100", "Reconciling port group");
//! ```

pub mod logging;

pub use logging::{init, init_logging, init_logging_json, LogFormat};
