//! Pushgate gateway core
//!
//! The delivery pipeline: admission and splitting, the bounded queue,
//! the worker pool, the provider adapters (APNs, legacy FCM, FCM v1),
//! the APNs provider-token lifecycle, and the HTTP front-end.

pub mod access;
pub mod apns;
pub mod fcm;
pub mod fcm_v1;
pub mod gateway;
pub mod provider;
pub mod server;
pub mod stats;
pub mod token;
pub mod transport;
pub mod worker;

pub use gateway::{AdmitError, Gateway};
pub use provider::{Provider, ProviderError};
pub use worker::Dispatch;
