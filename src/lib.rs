// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod app;
pub mod cache;
pub mod classify;
pub mod config;
pub mod error;
pub mod history;
pub mod ingest;
pub mod metrics;
pub mod mood;
pub mod scheduler;
pub mod scoring;

pub use crate::api::router;
pub use crate::app::{Collaborators, Services};
