//! Pushgate event-bus adapter
//!
//! Consumes push envelopes from the message bus and blocks each
//! invocation until the queue drains and all in-flight deliveries
//! complete.

pub mod subscriber;

pub use subscriber::Subscriber;
