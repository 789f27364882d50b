//! Where snapshots come from: the scrape API client, the HTML listing
//! heuristic and category labelling.

use async_trait::async_trait;

use crate::models::ListingObservation;
use crate::Result;

pub mod category;
pub mod extract;
pub mod source;

pub use category::infer_category;
pub use extract::{extract_listings, ListingExtractor};
pub use source::FirecrawlSource;

/// Produces the raw observations for one run.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch the current catalog. Failures surface as
    /// [`AppError::UpstreamFetch`](crate::AppError::UpstreamFetch).
    async fn fetch(&self) -> Result<Vec<ListingObservation>>;
}
