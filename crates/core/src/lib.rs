//! Domain logic for the speech progress prediction service.
//!
//! Everything here is HTTP-agnostic: the [`dispatch::Dispatcher`] takes a
//! transcript, runs the external inference script through a fallback chain
//! of interpreters, and returns either a prediction or a [`DispatchError`].

pub mod dispatch;
pub mod error;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use error::DispatchError;
