//! Riverbero relay layer.
//!
//! Everything between a cache's feeds and a remote observer's socket:
//!
//! - [`subscriber`]: one listener with a bounded outbound queue
//! - [`pool`]: fan-out with the drop-slow-consumer policy
//! - [`server`]: WebSocket subscribe endpoint and server lifecycle
//! - [`bridge`]: pumps a reduction feed into a server's broadcast

mod bridge;
mod error;
mod pool;
mod server;
pub mod subscriber;

pub use bridge::spawn_reducer_bridge;
pub use error::RelayError;
pub use pool::SubscriberPool;
pub use server::{RelayOptions, RelayServer};
pub use subscriber::{Subscriber, SubscriberQueue};
