//! Routes Module
//!
//! HTTP route table.
//!
//! - **`router`** - `create_router`: top-level routes, fallback, tracing and CORS layers
//! - **`api_routes`** - Everything under `/api`

/// Main router creation
pub mod router;

/// API endpoint routes
pub mod api_routes;

pub use router::create_router;
