//! I/O helpers for repair commands.

pub mod config;
pub mod episode_log;
pub mod process;
pub mod provider;
pub mod sandbox;
pub mod task;
