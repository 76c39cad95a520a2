//! Adding clips from web pages.
//!
//! ```text
//!  submit(url) ─▶ tokio task: fetch page ─▶ find audio link ─▶ <title>
//!                   ─▶ sanitize ─▶ download ─▶ write file ─▶ IngestEvent
//! ```

pub mod extract;
pub mod fetcher;
pub mod pipeline;

pub use extract::{extract_title, find_media_link, sanitize_title, MediaLink};
pub use fetcher::{FetchError, HttpFetcher, PageFetcher};
pub use pipeline::{IngestError, IngestEvent, IngestPipeline, IngestTicket, IngestedClip};

#[cfg(test)]
pub use fetcher::StaticFetcher;
