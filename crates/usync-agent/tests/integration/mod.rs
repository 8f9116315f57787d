//! Integration tests for usync-agent.
//!
//! These tests drive the sync engine through its real transports:
//! - Push channel lifecycle against a mock WebSocket server
//! - REST fallback against a mock profile endpoint
//! - Application wiring end to end

pub mod common;
