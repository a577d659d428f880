//! Core types for container-use
//!
//! Foundation of the crate's type system: the strongly-typed error enum used
//! across every layer, the user-facing [`ErrorContext`] wrapper, and the
//! conversion helpers that turn arbitrary failures into actionable CLI
//! messages.
//!
//! # Error Handling Pattern
//!
//! ```rust
//! use container_use::core::{ContainerUseError, user_friendly_error};
//!
//! fn example_operation() -> anyhow::Result<String> {
//!     Err(ContainerUseError::EnvironmentNotFound { id: "sunny-otter".into() }.into())
//! }
//!
//! if let Err(e) = example_operation() {
//!     user_friendly_error(e).display();
//! }
//! ```

pub mod error;

pub use error::{ContainerUseError, ErrorContext, user_friendly_error};

/// Convenient result alias used throughout the crate.
pub type Result<T> = anyhow::Result<T>;
