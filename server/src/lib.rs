//! Pong server library.
//!
//! This module exposes the server components for use in tests and binaries.

pub mod config;
pub mod game_loop;
pub mod lobby;
pub mod match_loop;
pub mod match_state;
pub mod physics;
pub mod ws;
