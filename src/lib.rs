//! Library crate for portscope exposing the scan engine and its collaborators.
pub mod config;
pub mod error;
pub mod export;
pub mod geoip;
pub mod logging;
pub mod ports;
pub mod probe;
pub mod scanner;
pub mod server;
pub mod services;
pub mod store;
pub mod types;
