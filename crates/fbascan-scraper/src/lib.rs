pub mod error;
pub mod extract;
pub mod fetcher;
pub mod parse;
pub mod rate_limit;
pub mod retry;
pub mod transport;

pub use error::{ExtractError, FetchError, ValidationError};
pub use extract::{Extraction, FieldExtractor, RawRecord, UnparsedItem};
pub use fetcher::RetryingFetcher;
pub use parse::{parse_ean, parse_price, resolve_url, TypedValue};
pub use rate_limit::{RateLimiter, RateLimiterRegistry};
pub use retry::RetryPolicy;
pub use transport::{HttpTransport, Page, Transport};
