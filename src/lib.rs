//! Wake-on-LAN orchestration and host liveness monitoring.
//!
//! [`engine::Monitor`] is the shared context: it owns the per-host state
//! table, drives the periodic sweep, and serves the on-demand wake, status and
//! check-and-wake commands.

pub mod api;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod notify;
pub mod probe;
pub mod utils;
pub mod wol;
