//! Shared synctrack model types.
//!
//! Pure data: catalogs and sync modes, jobs and attempts, per-stream stats,
//! connection checkpoint state, and the read models handed to API layers.
//! Kept free of storage and engine dependencies so every crate can share them.

#![warn(clippy::pedantic)]

pub mod catalog;
pub mod history;
pub mod job;
pub mod progress;
pub mod state;
pub mod stats;
