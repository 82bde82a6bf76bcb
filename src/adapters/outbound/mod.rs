//! Outbound adapters implement the ports the application layer calls out to.

pub mod clock;
pub mod export;
pub mod openai;
