//! # soundtrack-core
//!
//! Core library for SoundTrack, a lifelogging system that pairs captured
//! photos and clips with music chosen for the wearer's mood.
//!
//! This library provides:
//! - The event-driven analysis-and-recommendation pipeline
//! - Domain types for media items, mood events and tracks
//! - Timeline and playlist projections
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! A notification flows through three steps, each in its own module:
//! - **Adapter** ([`events`]): normalize object-storage and document-store
//!   notifications into a [`PipelineEvent`]
//! - **Dispatcher** ([`dispatch`]): gate the event on content type or analysis
//!   completion
//! - **Executor** ([`executor`]): call the analysis or recommendation stage once,
//!   with a hard timeout and no retry
//!
//! [`Pipeline`] wires the three together. The content-understanding model, the
//! music catalog and both stores are external services.
//!
//! ## Example
//!
//! ```rust,no_run
//! use soundtrack_core::{Config, ObjectFinalized, Pipeline};
//!
//! # async fn run() -> soundtrack_core::Result<()> {
//! let config = Config::load()?;
//! let pipeline = Pipeline::new(config.pipeline)?;
//!
//! let outcome = pipeline
//!     .handle(ObjectFinalized::new("soundtrack-media", "p.png", "image/png"))
//!     .await;
//! println!("{:?}", outcome);
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use config::{Config, PipelineConfig};
pub use dispatch::{Action, Decision, Dispatcher, SkipReason, Stage};
pub use error::{CallError, DropReason, Error, Result};
pub use events::{DocumentCreated, Notification, ObjectFinalized, PipelineEvent, RawNotification};
pub use executor::{StageCall, StageExecutor, StageResponse};
pub use pipeline::{Outcome, Pipeline};
pub use types::*;

// Public modules
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod executor;
pub mod logging;
pub mod mood;
pub mod pipeline;
pub mod timeline;
pub mod track;
pub mod types;
