//! Domain Layer
//!
//! Entities, value objects, ports and pure services. Nothing here performs
//! I/O.

pub mod entities;
pub mod ports;
pub mod services;
pub mod value_objects;
