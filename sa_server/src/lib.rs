//! HTTP front end for the `saas_auth` session lifecycle.

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
