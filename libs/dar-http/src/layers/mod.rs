//! Tower layers composed by [`HttpClientBuilder`](crate::HttpClientBuilder)
//!
//! - [`UserAgentLayer`] sets a default User-Agent header
//! - [`RetryLayer`] retries with exponential backoff and honours `Retry-After`

mod retry;
mod user_agent;

pub use retry::{RETRY_ATTEMPT_HEADER, RetryLayer, RetryService, calculate_backoff};
pub use user_agent::{UserAgentLayer, UserAgentService};
