//! rattle daemon library.
//!
//! This library exposes internal modules for integration testing.
//! In production, `rattle-daemon` is used as a binary (main.rs).

pub mod dispatch;
pub mod metrics_server;
pub mod orchestrator;
pub mod render;
pub mod telegram;
