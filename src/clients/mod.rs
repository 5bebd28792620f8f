pub mod arxiv;
pub mod citations;
pub mod http;

pub use arxiv::ArxivClient;
pub use citations::CitationClient;
pub use http::{RateLimitedClient, RateLimiter};
