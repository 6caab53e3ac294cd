//! Slidegate - Sliding-Window Rate Limiting Middleware
//!
//! This crate bounds the request rate of each client to a fixed number of
//! requests per rolling time window. Clients are identified by their
//! forwarded or peer address, and over-limit requests are answered with a
//! 429 before reaching the application.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
