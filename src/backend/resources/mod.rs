//! Resource Module
//!
//! A group's files and documents as one listing, plus uploads, usage and
//! signed downloads.
//!
//! - **`aggregator`** - `ResourceAggregator` service
//! - **`handlers`** - HTTP handlers

pub mod aggregator;

pub mod handlers;

pub use aggregator::{ResourceAggregator, ResourceLimits};
