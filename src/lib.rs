//! Tinyurl - URL Shortening Service
//!
//! This crate shortens long URLs into compact codes with a bounded lifetime,
//! resolves codes back to their targets, and caps how many links each client
//! may create per time window. All state lives in a shared key-value store
//! (Redis in production) so any number of instances can serve traffic.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
pub mod shortener;
pub mod store;
