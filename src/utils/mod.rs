//! The `utils` module provides a collection of utility functions and common
//! definitions used across the hub.
//!
//! It centralizes the error types shared by every backend and controller,
//! the tracing subscriber setup and the helpers used to open Redis connections
//! from a backend DSN.

pub mod error;
pub mod logging;
pub mod redis;

#[cfg(test)]
mod tests;
