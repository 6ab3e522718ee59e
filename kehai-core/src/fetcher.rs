use async_trait::async_trait;

use kehai_types::{DataType, KehaiError, Quote};

/// An upstream quote source for one data type.
///
/// Implementations own their transport (HTTP client, scraper session) and
/// error normalization; the orchestrator composes them without assuming any
/// per-fetcher caching or retries. Errors must carry a recognizable
/// [`ErrorKind`](kehai_types::ErrorKind) so the resolver can decide between
/// retrying, moving on, and recording.
#[async_trait]
pub trait QuoteFetcher: Send + Sync {
    /// Stable identifier of this source (used in metrics, pacing, and the
    /// `source` tag of produced quotes).
    fn id(&self) -> &'static str;

    /// The single data type this source serves.
    fn data_type(&self) -> DataType;

    /// Initial position in the priority list; lower is consulted first.
    fn default_priority(&self) -> u32 {
        100
    }

    /// Fetch a normalized quote for one symbol.
    async fn fetch(&self, symbol: &str) -> Result<Quote, KehaiError>;
}
