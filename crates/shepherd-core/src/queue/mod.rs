//! Queue side of the supervisor: polling with redelivery dedup, and
//! resolving finished items back onto the queue.

mod client;
mod index;
mod retry;

pub use client::{QueueClient, Resolution};
pub use index::MessageIndex;
pub use retry::{BackoffPolicy, MAX_BACKOFF_RECEIVE_COUNT};
