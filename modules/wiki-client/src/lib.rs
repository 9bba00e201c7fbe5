pub mod cache;
pub mod client;
pub mod error;
pub mod fetcher;
pub mod sections;

pub use cache::PageCache;
pub use client::{WikiClient, WikiPage, MAX_LINKS};
pub use error::{Result, WikiError};
pub use fetcher::{Lookup, MediaWikiFetcher, PageFetcher, RawPage};
pub use sections::{parse_sections, section_url, summary, INTRODUCTION};
