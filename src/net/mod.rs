//! Networking modules for HTTP + Action Cable transport.
//!
//! SYSTEM CONTEXT
//! ==============
//! `api` handles REST calls with identity headers, `cable` owns the
//! realtime connection and its channel subscriptions on top of the
//! `cable_transport` seams, with `cable_socket` as the WebSocket backend
//! speaking the `cable_protocol` wire format.

pub mod api;
pub mod cable;
pub mod cable_protocol;
pub mod cable_socket;
pub mod cable_transport;
