#![allow(clippy::result_large_err)]

pub mod config;
pub mod ebms;
pub mod engine;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod pmode;
pub mod profile;
pub mod reliability;
pub mod security;
pub mod soap;
pub mod telemetry;
