//! Message Bus Client Library
//!
//! Provides a unified interface for publishing and consuming events
//! from the message bus (NATS, or an in-process bus for tests and local runs).

pub mod error;
pub mod memory;
pub mod nats;
pub mod traits;

pub use error::*;
pub use memory::*;
pub use nats::*;
pub use traits::*;
