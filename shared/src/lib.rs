//! Shared types, configuration, database access and asset bookkeeping for yrp.
pub mod assets;
pub mod config;
pub mod db;
pub mod errors;
pub mod filter;
pub mod library;
pub mod models;
pub mod queue;

pub use errors::{YrpError, YrpResult};
pub use library::{Library, Video};
