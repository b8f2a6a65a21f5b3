//! Carewarden - request governance for the health system API
//!
//! Puts three checks in front of every request, in this order: a maintenance
//! gate, a global concurrency ceiling, and per-route fixed-window rate limits.
//! All state is in-process and owned by a [`governance::Governor`] built at
//! startup; nothing is shared across nodes.

pub mod config;
pub mod error;
pub mod governance;
pub mod http;
