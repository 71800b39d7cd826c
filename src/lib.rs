//! # Backgammon Mistake-Quiz Server (gammon-quiz)
//!
//! Turns a player's recent online matches into a personalized
//! spaced-repetition quiz. Every checker-play decision is re-evaluated by an
//! external GNU Backgammon process; plays that lose more equity than a
//! configurable threshold become multiple-choice quiz positions, stored per
//! user and served back in priority order.
//!
//! **Architecture:** axum HTTP/SSE surface over a tokio runtime, SQLite via
//! sqlx for per-user documents, a single-slot crawl queue feeding the one
//! engine process.

pub mod analyzer;
pub mod api;
pub mod board;
pub mod config;
pub mod crawl;
pub mod db;
pub mod engine;
pub mod error;
pub mod events;
pub mod quiz;
pub mod transcript;

pub use error::{Error, Result};
