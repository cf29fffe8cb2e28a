//! flowpush core library
//!
//! Subscriber registry, fan-out, events and the auth gate behind the
//! live task-update transports.

pub mod auth;
pub mod config;
pub mod error;
pub mod event;
pub mod hub;
pub mod notifier;

pub use error::{AuthError, PushError, PushResult};
pub use event::{Payload, TaskEvent};
pub use hub::Hub;
