//! Pulse Server - analytics event ingress.
//!
//! This crate provides the HTTP front door of SaaS Pulse, responsible for:
//! - Issuing bearer tokens to callers
//! - Authenticating and validating incoming events
//! - Publishing each event to the `analytics-events` topic, keyed by user
//!
//! # Architecture
//!
//! The server keeps no state of its own. Every accepted event is handed to a
//! single shared [`producer::EventProducer`], which writes to the event bus
//! through the [`bus::EventBus`] trait. Downstream consumers own storage and
//! aggregation.

pub mod auth;
pub mod bus;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod producer;
pub mod response;
pub mod routes;
pub mod types;
