//! Core library for the agent orchestration service
//!
//! This crate contains the data model shared by the runner and the API:
//! - Session event log and store
//! - Scenario and agent definitions
//! - Tool registry and built-in tools
//! - Mock business data

pub mod error;
pub mod event;
pub mod mock;
pub mod scenario;
pub mod session;
pub mod tool;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
