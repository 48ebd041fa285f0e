//! Schema-driven conversion between binary save files and JSON documents.
//!
//! A schema is written once as rule functions over a [`engine::Builder`];
//! the same compiled commands drive both loading (bytes to document) and
//! saving (document to bytes).

pub mod archive;
pub mod config;
pub mod engine;
pub mod error;
pub mod rules;
pub mod stream;

pub use config::EngineOptions;
pub use engine::{Input, Output, TransformationEngine, Transformed};
pub use error::{ErrorKind, TransformError, Warning, WarningKind};
pub use stream::ChunkedTransform;
