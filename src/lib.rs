//! Opsdeck Admin Gateway Library
//!
//! This library provides the core functionality for the opsdeck admin
//! gateway: privileged user administration with an audit trail, per-client
//! rate limiting, profile management, and a realtime presence feed, all
//! on top of a hosted identity/database/storage platform.

pub mod admin;
pub mod audit;
pub mod backend;
pub mod config;
pub mod error;
pub mod profile;
pub mod rate_limit;
pub mod realtime;
pub mod server;
