//! HTTP API: configuration, identity middleware, routing, and decision mapping.

pub mod app;
pub mod config;
pub mod context;
pub mod middleware;
