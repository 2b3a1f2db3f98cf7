//! # Channel Transport
//!
//! Topic-scoped pub/sub used to pair two clients. [`ChannelTransport`] is
//! the seam; [`MemoryHub`] is the in-process implementation.

pub mod memory;
pub mod transport;

pub use memory::{MemoryHub, MemoryTransport};
pub use transport::{ChannelFrame, ChannelTransport, Subscription, TransportError};
