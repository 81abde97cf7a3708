//! Herald Types
//!
//! Shared type definitions for events, delivery messages, channel
//! descriptors and outcomes used across all Herald services.

pub mod channel;
pub mod error;
pub mod events;
pub mod message;
pub mod outcome;
pub mod schemas;

pub use channel::*;
pub use error::*;
pub use events::*;
pub use message::*;
pub use outcome::*;
pub use schemas::*;
