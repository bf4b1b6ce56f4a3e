//! Waypoint Server
//!
//! Resolver daemon: a discovery cache over the etcd-backed tree registry,
//! served over HTTP.

pub mod api;
pub mod app;
pub mod cli;
pub mod observability;
