//! Page fetching and answer extraction.
//!
//! The collaborator layer under the conversation engine: drive a browser
//! (or a plain HTTP client) to fetch a rendered answer page, then turn one
//! HTML snapshot into a typed sequence of content blocks. The engine only
//! ever sees the `PageFetcher` and `ContentExtractor` traits.

pub mod block;
pub mod error;
pub mod extract;
pub mod fetch;

pub use block::ContentBlock;
pub use error::{Error, Result};
pub use extract::{AnswerExtractor, ContentExtractor, ExtractorConfig};
pub use fetch::{BrowserFetcher, FetchConfig, HttpFetcher, PageFetcher};
