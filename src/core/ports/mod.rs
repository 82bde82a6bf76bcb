//! Directional port definitions for the clean architecture rings.
//! Inbound ports are the use cases driving adapters call into,
//! outbound ports are services the application layer calls out to.

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
