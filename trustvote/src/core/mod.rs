/*!
Core modules for the TrustVote backend, admin commands and results watcher
*/

pub mod commands;
pub mod config;
pub mod error;
pub mod event_system;
pub mod funding;
pub mod output_plugins;
pub mod server;
pub mod tracker;
