//! HTTP request handlers
//!
//! - `api` - Health check endpoint
//! - `config` - Runtime configuration: prompt sections, providers, STT timeout
//! - `offer` - Connection offer / renegotiation endpoint

pub mod api;
pub mod config;
pub mod offer;
