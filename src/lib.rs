// Library root: exposes internals for integration tests.
// The binary entry point is src/main.rs.

pub mod commands;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod image;
pub mod llm;
pub mod logger;
pub mod session;
pub mod subsystems;
