//! Booking Live - Real-time booking notifications
//!
//! This crate pushes "booking created" events to restaurant dashboards over
//! a shared WebSocket link: a server that routes events to restaurant rooms,
//! and a client side that keeps one reference-counted link per process and
//! exposes per-dashboard notification state.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
