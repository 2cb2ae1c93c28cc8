//! # Glyscan Core Library
//!
//! Recognition-to-record matching for food photos: turn a vision model's
//! free-form reply into nutrition records and a glycemic-load (GL) score.
//!
//! The pipeline, leaves first:
//!
//! - **GL engine** ([`gl`]): pure GL arithmetic, safety class, safe serving
//! - **Parser** ([`parser`]): opaque model output → [`Detection`]s
//! - **Match cache** ([`cache`]): TTL + FIFO-bounded lookups with durable
//!   snapshots
//! - **Resolver** ([`resolver`]): concurrent multi-query search, dedup, rank
//! - **Coordinator** ([`coordinator`]): auto-select / pending / dropped
//! - **Fallback** ([`fallback`]): similar foods, category defaults, templates
//! - **Taxonomy** ([`taxonomy`]): retry / fallback policy for failures
//!
//! [`pipeline::AnalysisPipeline`] wires them together. The vision model and
//! the nutrition store are injected through the [`store::Recognizer`] and
//! [`store::NutritionStore`] traits.

#![deny(clippy::unwrap_used)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod advice;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fallback;
pub mod gl;
pub mod logging;
pub mod parser;
pub mod pipeline;
pub mod resolver;
pub mod store;
pub mod taxonomy;
pub mod types;

pub use cache::MatchCache;
pub use config::GlyscanConfig;
pub use error::GlyscanError;
pub use pipeline::{AnalysisOutcome, AnalysisPhase, AnalysisPipeline};
pub use resolver::FoodMatchResolver;
pub use taxonomy::{ClassifiedError, TransportError};
pub use types::*;
