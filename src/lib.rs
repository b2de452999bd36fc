//! framebridge: a request/response bridge between a controller and a
//! content context that evaluates expressions, synthesizes clicks, and
//! hosts background workers.

pub mod bridge;
pub mod cli;
pub mod commands;
pub mod config;
pub mod content;
pub mod error;
pub mod protocol;

pub use error::{BridgeError, Result};
