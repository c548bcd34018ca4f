//! services/api/src/lib.rs
//!
//! The HTTP service around the PDF exchange core: configuration, storage
//! adapters and the axum web layer.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;

pub use web::build_router;
