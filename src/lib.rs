//! Desktop soundboard: clip library, low-latency mixing playback, virtual
//! microphone routing, keyboard shortcuts and clip ingest from web pages.

pub mod app;
pub mod config;
pub mod controller;
pub mod hotkey;
pub mod ingest;
pub mod library;
pub mod playback;
pub mod routing;
