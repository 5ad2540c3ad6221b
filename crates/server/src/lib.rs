//! HTTP surface over the extraction pipeline, exposed as a library so
//! integration tests can drive the router in-process.

pub mod api;
pub mod metrics;
pub mod state;
