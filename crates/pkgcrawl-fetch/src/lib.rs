pub mod cache;
pub mod client;
pub mod error;
pub mod fetcher;
pub mod permits;
pub mod transport;

pub use cache::ResponseCache;
pub use client::{ClientConfig, HttpClient};
pub use error::{FetchError, Result};
pub use fetcher::Fetcher;
pub use transport::{MemoryTransport, RawResponse, Transport};
