//! The interactive chat terminal.
//!
//! This module provides the session controller behind the REPL:
//!
//! - Login and a persisted session that survives restarts
//! - Background polling of the open conversation
//! - Friend and friend-request management
//! - Slash commands for session control
//!
//! # Architecture
//!
//! The module is organized into several components:
//!
//! - [`config`]: CLI argument parsing and the settings file
//! - [`session`]: the [`ChatSession`] state machine
//! - [`commands`]: Slash command parsing

mod commands;
mod config;
mod session;

pub use crate::render::{PlainTextRenderer, Renderer};
pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{
    ChatArgs, ChatConfig, DEFAULT_MAX_MESSAGES, DEFAULT_REFRESH_INTERVAL_MS, DEFAULT_SERVER_URL,
    DEFAULT_TIME_FORMAT, default_config_dir,
};
pub use session::{ChatSession, LoginPolicy, Phase};
