//! Core types and shared functionality for liteproxy.
//!
//! This crate provides:
//! - Resource descriptors, unstructured objects and list/status envelopes
//! - Content negotiation and watch stream decoding
//! - Response cache with SQLite and filesystem backends
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod resource;

pub use cache::{CacheManager, CacheStore};
pub use config::AppConfig;
pub use error::Error;
pub use resource::{ClientIdentity, ResourceDescriptor, Verb};
