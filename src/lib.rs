//! Aether - batch media conversion queue
//!
//! This library crate exposes the queue engine for the binary and for
//! integration testing.

pub mod config;
pub mod context;
pub mod engine;
pub mod events;
pub mod ingest;
pub mod notify;
pub mod queue;
pub mod scheduler;
pub mod session;
pub mod settings;
pub mod storage;
pub mod thumbnails;

pub use context::AppContext;
