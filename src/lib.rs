//! Handoff: rendezvous coordinator and chunked peer-to-peer file transfer.
//!
//! - [`signaling`]: room registry and per-connection signaling sessions
//! - [`api`]: axum websocket and HTTP surface for the coordinator
//! - [`transfer`]: sender/receiver sessions over an open peer channel
//! - [`config`], [`metrics`]: ambient configuration and Prometheus metrics

pub mod api;
pub mod config;
pub mod metrics;
pub mod signaling;
pub mod transfer;
