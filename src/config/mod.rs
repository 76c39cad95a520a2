//! Configuration module for the soundboard.
//!
//! Provides `AppSettings` (hand-edited `settings.toml`), `LibraryConfig`
//! (machine-written `library.json`) and `AppPaths` for cross-platform data
//! directories.

pub mod library;
pub mod paths;
pub mod settings;

pub use library::{LibraryConfig, DEFAULT_MIC_GAIN, DEFAULT_VOLUME};
pub use paths::AppPaths;
pub use settings::{AppSettings, IngestSettings, RoutingSettings, UiSettings};
