//! # glyscan-remote
//!
//! HTTP implementations of the two collaborators `glyscan-core` injects:
//!
//! - [`VisionClient`]: a [`Recognizer`](glyscan_core::store::Recognizer)
//!   over an OpenAI-compatible chat-completions vision model
//! - [`HttpNutritionStore`]: a
//!   [`NutritionStore`](glyscan_core::store::NutritionStore) over the food
//!   database search endpoint
//!
//! Both map their failures onto [`glyscan_core::TransportError`] so the core
//! taxonomy can decide between retry, fallback and surfacing the error.

#![deny(clippy::unwrap_used)]
#![warn(missing_docs)]

pub mod error;
pub mod food_search;
pub mod prompt;
pub mod types;
pub mod vision;

pub use error::RemoteError;
pub use food_search::HttpNutritionStore;
pub use vision::{VisionClient, VisionProvider};
