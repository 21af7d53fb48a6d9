pub mod currencybeacon;

pub use currencybeacon::CurrencyBeaconClient;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::FetchError;

/// The currency API as seen by the pipeline.
///
/// Payloads are returned as raw JSON; shaping them into rows is the
/// projector's job. Retries and authentication belong to the implementation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// The full currency catalog. Empty when the API returned no data.
    async fn fetch_currencies(&self) -> Result<Vec<Value>, FetchError>;

    /// A `{base, rates}` payload for `base` against `targets`, or `None` when
    /// the API returned no data.
    async fn fetch_rates(&self, base: &str, targets: &[String])
        -> Result<Option<Value>, FetchError>;
}
