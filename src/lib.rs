//! # Keyrank
//!
//! Ranks a small personal collection of API keys by how relevant each one is
//! to the website currently being viewed.
//!
//! ## Overview
//!
//! - [`scoring`] turns a key, a URL and the usage ledger into a score and
//!   orders the collection
//! - [`ledger`] keeps per-domain usage counts, merges duplicates and ages
//!   records out
//! - [`service`] owns the state, applies UI/background requests and persists
//!   through a [`store::KeyStore`]
//!
//! Every time-dependent operation takes "now" as an argument.
//!
//! ## Features
//!
//! - `colors` (default): Enables terminal color output via owo-colors

/// Command-line argument parsing and configuration
pub mod cli;

/// Text and JSON output
pub mod display;

/// Per-domain usage history
pub mod ledger;

/// Data models for keys, usage records and trigger messages
pub mod models;

/// Relevance scoring and ranking
pub mod scoring;

/// Request handling over the key collection and ledger
pub mod service;

/// Persistence backends
pub mod store;

/// Utility functions for URLs, formatting, and time
pub mod utils;
