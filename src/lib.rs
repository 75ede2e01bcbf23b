//! ModelChat - a chat-bot bridge to cloud and local LLM backends
//!
//! This crate provides:
//! - Moderation (ban lists, blocked words) and admin management
//! - Per-user conversation history with bounded retention
//! - Plain and tool-augmented model backends, plus a vision adapter
//! - The turn pipeline, continuous-session mode and `#` command dispatch
//! - An admin HTTP console and a Telegram channel

pub mod admin;
pub mod agent;
pub mod bot;
pub mod chat;
pub mod commands;
pub mod config;
pub mod history;
pub mod moderation;
pub mod paths;
pub mod server;
pub mod session;
pub mod store;

#[cfg(test)]
mod testing;

pub use config::Config;
