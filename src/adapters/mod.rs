//! Adapters Layer
//!
//! Inbound adapters drive the application (admin API); outbound adapters
//! implement the domain ports (stores, transports, sinks).

pub mod inbound;
pub mod outbound;
