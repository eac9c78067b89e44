//! Gatekeeper - Distributed Request Rate Limiting
//!
//! This crate implements a fixed-window rate limiter that sits in front of
//! request handling as a gate. Counters live in a shared store (Redis) so
//! that any number of gate replicas agree on a single count per caller,
//! with expiry handled by the store itself.

pub mod config;
pub mod error;
pub mod gate;
pub mod ratelimit;
pub mod server;
pub mod store;
