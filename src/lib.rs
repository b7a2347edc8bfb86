//! bookforge: a self-hosted book writing server.
//!
//! This crate provides an HTTP API for authoring books: chapters and
//! supporting elements (dedication, preface, ...), image placement inside
//! chapter text, a table-of-contents page estimator, lightweight text
//! rewriting helpers, and export to PDF/EPUB/DOCX/HTML/JSON.
//!
//! # Features
//!
//! - User accounts with token authentication and profiles
//! - Book, chapter and element CRUD with per-owner visibility
//! - Image uploads with per-image layout properties (position, scale,
//!   float/wrap keywords) rendered to CSS classes
//! - Table of contents estimated from word counts, refreshed on change
//!   events through a typed in-process channel
//! - Deterministic text heuristics with an audit trail
//! - Export generators for PDF, EPUB, DOCX, HTML and JSON

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Text heuristics ("AI" assistance) and prompt building.
pub mod assist;
/// Authentication and user management.
pub mod auth;
/// Configuration and CLI.
pub mod config;
/// Database operations.
pub mod db;
/// Error types.
pub mod error;
/// Typed change-event channel.
pub mod events;
/// Export document generators.
pub mod export;
/// Image layout properties and CSS mapping.
pub mod layout;
/// HTTP server.
pub mod server;
/// Upload file storage.
pub mod storage;
/// Table-of-contents estimation.
pub mod toc;

#[cfg(test)]
mod tests;

pub use config::{Cli, Command, Config};
pub use db::Database;
pub use error::{AppError, Result};
pub use server::AppState;
