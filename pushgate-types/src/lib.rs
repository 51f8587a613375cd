//! Pushgate Types
//!
//! Shared type definitions for push requests, work items, and the
//! per-notification validator used by all pushgate crates.

pub mod error;
pub mod notification;

pub use error::*;
pub use notification::*;
