//! Cowsay Chat Bot Library
//!
//! A Twitch chat bot for a single channel.
//!
//! This crate provides the core functionality for:
//! - Obtaining and storing a Twitch user token
//! - Connecting to Twitch chat over WebSocket
//! - Dispatching chat events to typed handlers
//! - Answering the `!reply` and allow-listed `!asdf` (cowsay) commands

pub mod auth;
pub mod chat;
pub mod commands;
pub mod config;
pub mod dispatcher;
